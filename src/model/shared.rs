//! Helpers for turning raw model output into something the engine can use.

/// Extract a JSON object from a model response. Accepts a bare object, an
/// object wrapped in markdown code fences, or the outermost `{...}` span of
/// surrounding prose.
pub fn parse_json_payload(response: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(response.trim()) {
        return Some(value);
    }

    let without_fences = strip_code_fences(response);
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(without_fences.trim()) {
        return Some(value);
    }

    let trimmed = response.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<serde_json::Value>(&trimmed[start..=end]).ok()
}

/// Drop markdown fence lines (```json, ```), keeping what was inside them.
pub fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Clean a narrator reply for display: drop a leading speaker label the model
/// sometimes adds and collapse runs of blank lines.
pub fn clean_narration(text: &str) -> String {
    let trimmed = text.trim();
    let body = ["Narrator:", "NARRATOR:", "Game Master:", "GM:"]
        .iter()
        .find_map(|label| trimmed.strip_prefix(label))
        .unwrap_or(trimmed)
        .trim_start();

    let mut result = String::with_capacity(body.len());
    let mut prev_blank = false;
    for line in body.lines() {
        let blank = line.trim().is_empty();
        if blank && prev_blank {
            continue;
        }
        prev_blank = blank;
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(line.trim_end());
    }
    result.trim().to_string()
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
