//! Model catalog - known Chat Completions models and defaults.

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model metadata entry.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub context_window: u32,
    pub description: String,
}

pub struct ModelCatalog;

impl ModelCatalog {
    pub fn all_models() -> Vec<ModelInfo> {
        [
            ("gpt-4o-mini", 128_000, "Fast, low-cost narration and scoring"),
            ("gpt-4o", 128_000, "Richer case generation and evaluation"),
            ("gpt-4.1-mini", 1_047_576, "Long transcripts at low cost"),
            ("gpt-4.1", 1_047_576, "Highest quality long-form narration"),
        ]
        .into_iter()
        .map(|(name, context_window, description)| ModelInfo {
            name: name.to_string(),
            context_window,
            description: description.to_string(),
        })
        .collect()
    }

    pub fn context_window(model: &str) -> Option<u32> {
        Self::all_models()
            .into_iter()
            .find(|m| m.name == model)
            .map(|m| m.context_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_listed() {
        assert!(ModelCatalog::context_window(DEFAULT_MODEL).is_some());
        assert_eq!(ModelCatalog::context_window("not-a-model"), None);
    }
}
