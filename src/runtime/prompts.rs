//! Prompt builders for case generation, narration and evaluation.

use crate::core::catalog::{Difficulty, SimulationKind};
use crate::core::session::TurnRole;
use crate::db::queries::TurnRow;
use crate::model::shared::truncate_chars;
use crate::model::{ChatMessage, ChatRequest};
use crate::runtime::generation_settings::CallSettings;
use crate::runtime::state::GameState;

/// Most recent turns replayed to the narrator.
pub const NARRATION_HISTORY_TURNS: usize = 40;
/// Per-turn cap when the transcript is sent for evaluation.
const EVALUATION_TURN_CHARS: usize = 1_200;

pub fn case_generation_request(
    kind: SimulationKind,
    difficulty: Difficulty,
    settings: &CallSettings,
) -> ChatRequest {
    let shape = if kind.is_detective() {
        format!(
            r#"{{
  "title": string,
  "setting": string,
  "victim": string,
  "opening": string (2-4 sentences addressed to the player),
  "suspects": [{{ "name": string, "description": string, "alibi": string, "motive": string }}],
  "clues": [{{ "id": short slug, "description": string, "location": string, "implicates": suspect name or null }}],
  "culprit": the name of exactly one suspect
}}
Include exactly {} suspects and between 4 and 7 clues. The culprit must be solvable from the clues."#,
            difficulty.suspect_count()
        )
    } else {
        r#"{
  "title": string,
  "setting": string,
  "opening": string (2-4 sentences addressed to the player),
  "suspects": [{ "name": string, "description": string }] (the other people in the scenario),
  "clues": [{ "id": short slug, "description": string, "location": string }] (facts the player can uncover)
}"#
        .to_string()
    };

    let system = format!(
        "You design training simulations.\n\
         Scenario: {}\n{}\n\
         Difficulty: {}.\n\
         Respond with a single JSON object of this shape and nothing else:\n{}",
        kind.display_name(),
        kind.brief(),
        difficulty.as_str(),
        shape
    );

    let mut req = ChatRequest::new(
        system,
        vec![ChatMessage::user(format!(
            "Create a new {} scenario.",
            kind.display_name()
        ))],
    );
    req.json_mode = true;
    req.temperature = settings.temperature;
    req.max_tokens = Some(settings.max_tokens);
    req
}

/// System prompt for the narrator. It carries the hidden facts so replies
/// stay consistent, with an instruction never to reveal them.
pub fn narrator_system_prompt(state: &GameState) -> String {
    let kind = state.kind;
    let case = &state.case;
    let mut prompt = format!(
        "You are the narrator of a {} simulation titled \"{}\".\n{}\nSetting: {}\n",
        kind.display_name(),
        case.title,
        kind.brief(),
        case.setting
    );
    if let Some(victim) = &case.victim {
        prompt.push_str(&format!("Victim: {victim}\n"));
    }

    if !case.suspects.is_empty() {
        prompt.push_str("\nPeople:\n");
        for s in &case.suspects {
            prompt.push_str(&format!("- {}: {}", s.name, s.description));
            if !s.alibi.is_empty() {
                prompt.push_str(&format!(" Alibi: {}.", s.alibi));
            }
            if !s.motive.is_empty() {
                prompt.push_str(&format!(" Motive: {}.", s.motive));
            }
            prompt.push('\n');
        }
    }

    if !case.clues.is_empty() {
        prompt.push_str("\nClues (id, where, what):\n");
        for c in &case.clues {
            let found = if state.discovered_clues.contains(&c.id) {
                " [found]"
            } else {
                ""
            };
            prompt.push_str(&format!("- {} ({}): {}{found}\n", c.id, c.location, c.description));
        }
    }

    match (&case.culprit, &state.accusation) {
        (Some(culprit), None) => prompt.push_str(&format!(
            "\nHidden truth: the culprit is {culprit}. Never state or hint this directly; \
             let the player reach it through clues and interviews.\n"
        )),
        (Some(culprit), Some(acc)) => prompt.push_str(&format!(
            "\nThe player accused {} and was {}. The culprit is {culprit}; you may now reveal how it happened.\n",
            acc.suspect,
            if acc.correct { "right" } else { "wrong" }
        )),
        (None, _) => {}
    }

    prompt.push_str(
        "\nRules: stay in the second person, keep replies under 180 words, \
         never make decisions for the player, and end with a short prompt for their next move. \
         Players may use /examine <clue>, /interview <name>, /note <text>, /hint and /accuse <name>.",
    );
    prompt
}

pub fn narration_request(
    state: &GameState,
    transcript: &[TurnRow],
    action_context: Option<&str>,
    settings: &CallSettings,
) -> ChatRequest {
    let start = transcript.len().saturating_sub(NARRATION_HISTORY_TURNS);
    let mut messages: Vec<ChatMessage> = transcript[start..].iter().map(turn_message).collect();

    if let Some(context) = action_context {
        messages.push(ChatMessage::user(format!(
            "[game engine] {context} Narrate the result of this action."
        )));
    }

    let mut req = ChatRequest::new(narrator_system_prompt(state), messages);
    req.temperature = settings.temperature;
    req.max_tokens = Some(settings.max_tokens);
    req
}

/// Ask for a short assessment ending with one `<parameter>: N/10` line per
/// scoring parameter, which is what the scorer looks for.
pub fn evaluation_request(
    state: &GameState,
    transcript: &[TurnRow],
    settings: &CallSettings,
) -> ChatRequest {
    let params = state.kind.parameters();
    let score_lines: Vec<String> = params.iter().map(|p| format!("{}: N/10", p.name)).collect();

    let system = format!(
        "You assess a trainee's performance in a {} simulation.\n\
         Write 3-5 sentences of feedback about what they did well and what to improve, \
         then finish with exactly these lines, replacing N with an integer from 0 to 10:\n{}",
        state.kind.display_name(),
        score_lines.join("\n")
    );

    let mut body = String::new();
    body.push_str(&format!("Scenario: {}\n", state.case.title));
    if let Some(acc) = &state.accusation {
        body.push_str(&format!(
            "Final accusation: {} ({}).\n",
            acc.suspect,
            if acc.correct { "correct" } else { "incorrect" }
        ));
    }
    body.push_str(&format!(
        "Clues found: {} of {}. Hints used: {}.\n\nTranscript:\n",
        state.discovered_clues.len(),
        state.case.clues.len(),
        state.hints_used
    ));
    for turn in transcript {
        let speaker = match turn.role.parse::<TurnRole>() {
            Ok(TurnRole::Player) => "Player",
            _ => "Narrator",
        };
        body.push_str(&format!(
            "{speaker}: {}\n",
            truncate_chars(&turn.content, EVALUATION_TURN_CHARS)
        ));
    }

    let mut req = ChatRequest::new(system, vec![ChatMessage::user(body)]);
    req.temperature = settings.temperature;
    req.max_tokens = Some(settings.max_tokens);
    req
}

fn turn_message(turn: &TurnRow) -> ChatMessage {
    match turn.role.parse::<TurnRole>() {
        Ok(TurnRole::Player) => ChatMessage::user(turn.content.clone()),
        _ => ChatMessage::assistant(turn.content.clone()),
    }
}
