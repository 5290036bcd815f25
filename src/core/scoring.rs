//! Three-parameter scoring of a simulation transcript or evaluation text.
//!
//! Each parameter is taken from an explicit `"<parameter>: N/10"` line when
//! the text has one, and otherwise estimated from keyword hits around a
//! neutral 5. Decision data from the game (was the accusation right, how
//! much evidence was gathered) then nudges the individual scores.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::catalog::{ScoreParameter, SimulationKind};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;
pub const NEUTRAL_SCORE: f64 = 5.0;
const KEYWORD_WEIGHT: f64 = 1.0;

const CORRECT_OUTCOME_PRIMARY: f64 = 2.0;
const CORRECT_OUTCOME_TERTIARY: f64 = 1.0;
const EVIDENCE_THRESHOLD: u32 = 3;
const EVIDENCE_DELTA: f64 = 1.0;
const HINT_ALLOWANCE: u32 = 2;
const HINT_PENALTY: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Explicit,
    Keywords,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterScore {
    pub name: String,
    pub score: f64,
    pub source: ScoreSource,
    pub positive_hits: u32,
    pub negative_hits: u32,
}

/// Facts about how the player actually played, as opposed to how the text
/// describes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionData {
    /// The key decision was right (arrested the true culprit, escalated correctly).
    pub correct_outcome: Option<bool>,
    pub evidence_collected: Option<u32>,
    pub hints_used: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Outstanding,
    Proficient,
    Developing,
    NeedsImprovement,
}

impl Rating {
    pub fn for_overall(overall: u8) -> Rating {
        match overall {
            80.. => Rating::Outstanding,
            60..=79 => Rating::Proficient,
            40..=59 => Rating::Developing,
            _ => Rating::NeedsImprovement,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Rating::Outstanding => "Outstanding",
            Rating::Proficient => "Proficient",
            Rating::Developing => "Developing",
            Rating::NeedsImprovement => "Needs Improvement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationScore {
    pub kind: SimulationKind,
    pub parameters: Vec<ParameterScore>,
    /// Mean of the parameter scores scaled to 0..=100.
    pub overall: u8,
    pub rating: Rating,
    pub summary: String,
}

/// Score `text` for the simulation identified by a free-form type tag.
pub fn calculate_score(
    text: &str,
    game_type: &str,
    decision: Option<&DecisionData>,
) -> SimulationScore {
    score_for_kind(text, SimulationKind::from_tag(game_type), decision)
}

pub fn score_for_kind(
    text: &str,
    kind: SimulationKind,
    decision: Option<&DecisionData>,
) -> SimulationScore {
    let lowered = text.to_lowercase();
    let mut parameters: Vec<ParameterScore> = kind
        .parameters()
        .iter()
        .map(|param| score_parameter(text, &lowered, param))
        .collect();

    if let Some(decision) = decision {
        apply_decision(&mut parameters, decision);
    }

    let overall = overall_score(parameters.iter().map(|p| p.score));
    let rating = Rating::for_overall(overall);
    let summary = summarize(kind, &parameters, overall, rating);

    SimulationScore {
        kind,
        parameters,
        overall,
        rating,
        summary,
    }
}

fn score_parameter(text: &str, lowered: &str, param: &ScoreParameter) -> ParameterScore {
    let negative_hits = param.negative.iter().map(|kw| count_word(lowered, kw)).sum();
    // "missed clue" must not also count as "clue".
    let masked = param
        .negative
        .iter()
        .fold(lowered.to_string(), |text, kw| mask_word(&text, kw));
    let positive_hits = param.positive.iter().map(|kw| count_word(&masked, kw)).sum();

    match explicit_score(text, param.name) {
        Some(score) => ParameterScore {
            name: param.name.to_string(),
            score,
            source: ScoreSource::Explicit,
            positive_hits,
            negative_hits,
        },
        None => ParameterScore {
            name: param.name.to_string(),
            score: clamp_score(
                NEUTRAL_SCORE + KEYWORD_WEIGHT * f64::from(positive_hits)
                    - KEYWORD_WEIGHT * f64::from(negative_hits),
            ),
            source: ScoreSource::Keywords,
            positive_hits,
            negative_hits,
        },
    }
}

/// Find `"<name>: N/10"` (also `-`/`=` separators, `out of 10`, markdown bold).
pub fn explicit_score(text: &str, name: &str) -> Option<f64> {
    let name_pattern = regex::escape(name).replace(' ', r"\s+");
    let pattern = format!(
        r"(?i)\b{name_pattern}\b\**\s*[:=\-]\s*\**\s*(\d+(?:\.\d+)?)\s*(?:/\s*10\b|out\s+of\s+10\b)"
    );
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!("invalid score pattern for {name}: {e}");
            return None;
        }
    };
    let value: f64 = re.captures(text)?.get(1)?.as_str().parse().ok()?;
    Some(clamp_score(value))
}

/// Count whole-word, non-overlapping occurrences of `needle` in `haystack`.
/// Both are expected to be lowercase already.
pub fn count_word(haystack: &str, needle: &str) -> u32 {
    word_matches(haystack, needle).count() as u32
}

/// Blank out whole-word occurrences of `needle`, keeping byte offsets.
fn mask_word(haystack: &str, needle: &str) -> String {
    let found: Vec<usize> = word_matches(haystack, needle).collect();
    let mut masked = haystack.to_string();
    for idx in found {
        masked.replace_range(idx..idx + needle.len(), &" ".repeat(needle.len()));
    }
    masked
}

fn word_matches<'a>(haystack: &'a str, needle: &'a str) -> impl Iterator<Item = usize> + 'a {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    haystack
        .match_indices(needle)
        .filter(move |_| !needle.is_empty())
        .filter(move |(idx, _)| {
            let before = haystack[..*idx].chars().next_back();
            let after = haystack[idx + needle.len()..].chars().next();
            !before.is_some_and(is_word) && !after.is_some_and(is_word)
        })
        .map(|(idx, _)| idx)
}

fn apply_decision(parameters: &mut [ParameterScore], decision: &DecisionData) {
    let mut deltas = [0.0_f64; 3];

    match decision.correct_outcome {
        Some(true) => {
            deltas[0] += CORRECT_OUTCOME_PRIMARY;
            deltas[2] += CORRECT_OUTCOME_TERTIARY;
        }
        Some(false) => {
            deltas[0] -= CORRECT_OUTCOME_PRIMARY;
            deltas[2] -= CORRECT_OUTCOME_TERTIARY;
        }
        None => {}
    }

    match decision.evidence_collected {
        Some(n) if n >= EVIDENCE_THRESHOLD => deltas[1] += EVIDENCE_DELTA,
        Some(0) => deltas[1] -= EVIDENCE_DELTA,
        _ => {}
    }

    if decision.hints_used.is_some_and(|h| h > HINT_ALLOWANCE) {
        deltas[0] -= HINT_PENALTY;
    }

    // Clamp once, after every nudge has been summed.
    for (param, delta) in parameters.iter_mut().zip(deltas) {
        param.score = clamp_score(param.score + delta);
    }
}

pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return NEUTRAL_SCORE;
    }
    value.clamp(MIN_SCORE, MAX_SCORE)
}

/// Mean of the scores, scaled from 0..=10 to 0..=100 and rounded.
pub fn overall_score(scores: impl Iterator<Item = f64>) -> u8 {
    let (sum, count) = scores.fold((0.0, 0u32), |(sum, count), s| {
        (sum + clamp_score(s), count + 1)
    });
    if count == 0 {
        return 0;
    }
    let scaled = (sum / f64::from(count) * 10.0).round();
    scaled.clamp(0.0, 100.0) as u8
}

fn summarize(
    kind: SimulationKind,
    parameters: &[ParameterScore],
    overall: u8,
    rating: Rating,
) -> String {
    let strongest = parameters
        .iter()
        .reduce(|best, p| if p.score > best.score { p } else { best });
    let weakest = parameters
        .iter()
        .reduce(|worst, p| if p.score < worst.score { p } else { worst });

    let mut summary = format!(
        "{}: {} performance scored {overall}/100.",
        rating.label(),
        kind.display_name()
    );
    if let (Some(strong), Some(weak)) = (strongest, weakest) {
        if strong.score > weak.score {
            summary.push_str(&format!(
                " Strongest in {} ({:.1}/10); focus next on {} ({:.1}/10).",
                strong.name, strong.score, weak.name, weak.score
            ));
        } else {
            summary.push_str(" Performance was even across all parameters.");
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scores(result: &SimulationScore) -> Vec<f64> {
        result.parameters.iter().map(|p| p.score).collect()
    }

    #[test]
    fn explicit_scores_are_used_when_present() {
        let text = "Critical Thinking: 8/10\nEvidence Analysis: 6/10\nIntuition: 7 / 10";
        let result = calculate_score(text, "murder_mystery", None);
        assert_eq!(scores(&result), vec![8.0, 6.0, 7.0]);
        assert!(result
            .parameters
            .iter()
            .all(|p| p.source == ScoreSource::Explicit));
        assert_eq!(result.overall, 70);
        assert_eq!(result.rating, Rating::Proficient);
    }

    #[test]
    fn explicit_pattern_tolerates_markdown_and_case() {
        assert_eq!(
            explicit_score("**evidence analysis**: 9.5 out of 10", "Evidence Analysis"),
            Some(9.5)
        );
        assert_eq!(explicit_score("Intuition - 4/10", "Intuition"), Some(4.0));
        assert_eq!(explicit_score("Intuition: 14/10", "Intuition"), Some(10.0));
        assert_eq!(explicit_score("Intuition was great", "Intuition"), None);
    }

    #[test]
    fn keyword_fallback_is_centered_at_five() {
        let result = calculate_score("Nothing notable happened.", "murder_mystery", None);
        assert_eq!(scores(&result), vec![5.0, 5.0, 5.0]);
        assert_eq!(result.overall, 50);
        assert!(result
            .parameters
            .iter()
            .all(|p| p.source == ScoreSource::Keywords));
    }

    #[test]
    fn keywords_move_the_fallback_score() {
        let text = "A logical, reasoned approach. The detective examined every clue \
                    and checked each alibi, though they were fooled once.";
        let result = calculate_score(text, "murder_mystery", None);
        // Critical Thinking: logical + reasoned
        assert_eq!(result.parameters[0].score, 7.0);
        // Evidence Analysis: examined + clue + alibi
        assert_eq!(result.parameters[1].score, 8.0);
        // Intuition: fooled
        assert_eq!(result.parameters[2].score, 4.0);
    }

    #[test]
    fn keyword_matching_respects_word_boundaries() {
        assert_eq!(count_word("illogical but logical", "logical"), 1);
        assert_eq!(count_word("unclear and clear, clear.", "clear"), 2);
        assert_eq!(count_word("", "clear"), 0);
        assert_eq!(count_word("clear", ""), 0);
    }

    #[test]
    fn negative_phrases_do_not_count_as_praise() {
        let text = "The detective missed clue after missed clue and had no evidence.";
        let result = calculate_score(text, "murder_mystery", None);
        let evidence = &result.parameters[1];
        assert_eq!(evidence.name, "Evidence Analysis");
        assert_eq!(evidence.negative_hits, 3);
        assert_eq!(evidence.positive_hits, 0);
        assert_eq!(evidence.score, 2.0);

        // A bare keyword next to the phrase still counts.
        let text = "One missed clue, but the key clue was examined.";
        let evidence = &calculate_score(text, "murder_mystery", None).parameters[1];
        assert_eq!((evidence.positive_hits, evidence.negative_hits), (2, 1));
        assert_eq!(evidence.score, 6.0);
    }

    #[test]
    fn keyword_scores_are_clamped() {
        let text = "panic chaos panic chaos overwhelmed panic chaos lost control uncoordinated";
        let result = calculate_score(text, "hospital_crisis", None);
        assert_eq!(result.parameters[0].score, 0.0);
    }

    #[test]
    fn mixed_explicit_and_keyword_parameters() {
        let text = "Policy Knowledge: 9/10. The officer listened and was supportive.";
        let result = calculate_score(text, "posh", None);
        assert_eq!(result.parameters[0].source, ScoreSource::Explicit);
        assert_eq!(result.parameters[0].score, 9.0);
        assert_eq!(result.parameters[1].source, ScoreSource::Keywords);
        assert_eq!(result.parameters[1].score, 7.0);
    }

    #[test]
    fn correct_decision_nudges_primary_and_tertiary() {
        let decision = DecisionData {
            correct_outcome: Some(true),
            evidence_collected: Some(4),
            hints_used: Some(0),
        };
        let result = calculate_score("", "murder_mystery", Some(&decision));
        assert_eq!(scores(&result), vec![7.0, 6.0, 6.0]);
        assert_eq!(result.overall, 63);
    }

    #[test]
    fn wrong_decision_and_heavy_hints_are_penalized_and_clamped() {
        let decision = DecisionData {
            correct_outcome: Some(false),
            evidence_collected: Some(0),
            hints_used: Some(5),
        };
        let text = "Critical Thinking: 1/10, Evidence Analysis: 0/10, Intuition: 0/10";
        let result = calculate_score(text, "murder_mystery", Some(&decision));
        assert_eq!(scores(&result), vec![0.0, 0.0, 0.0]);
        assert_eq!(result.overall, 0);
        assert_eq!(result.rating, Rating::NeedsImprovement);
    }

    #[test]
    fn nudges_are_summed_before_clamping() {
        let decision = DecisionData {
            correct_outcome: Some(true),
            evidence_collected: None,
            hints_used: Some(4),
        };
        let result = calculate_score("Critical Thinking: 9/10", "murder_mystery", Some(&decision));
        // 9 + 2 - 1 = 10, not min(9 + 2, 10) - 1 = 9
        assert_eq!(result.parameters[0].score, 10.0);
    }

    #[test]
    fn unknown_type_uses_general_parameters() {
        let result = calculate_score("Decision Making: 10/10", "space_pirates", None);
        assert_eq!(result.kind, SimulationKind::General);
        assert_eq!(result.parameters[1].name, "Decision Making");
        assert_eq!(result.parameters[1].score, 10.0);
    }

    #[test]
    fn rating_buckets() {
        assert_eq!(Rating::for_overall(100), Rating::Outstanding);
        assert_eq!(Rating::for_overall(80), Rating::Outstanding);
        assert_eq!(Rating::for_overall(79), Rating::Proficient);
        assert_eq!(Rating::for_overall(60), Rating::Proficient);
        assert_eq!(Rating::for_overall(59), Rating::Developing);
        assert_eq!(Rating::for_overall(40), Rating::Developing);
        assert_eq!(Rating::for_overall(39), Rating::NeedsImprovement);
    }

    #[test]
    fn overall_handles_empty_and_nan() {
        assert_eq!(overall_score(std::iter::empty()), 0);
        assert_eq!(overall_score([f64::NAN, 5.0].into_iter()), 50);
        assert_eq!(overall_score([10.0, 10.0, 9.0].into_iter()), 97);
    }

    #[test]
    fn summary_names_strongest_and_weakest() {
        let text = "Source Verification: 9/10\nCritical Thinking: 6/10\nMedia Literacy: 3/10";
        let result = calculate_score(text, "fake_news", None);
        assert_eq!(
            result.summary,
            "Proficient: Fake News Desk performance scored 60/100. Strongest in Source Verification (9.0/10); focus next on Media Literacy (3.0/10)."
        );
    }

    #[test]
    fn even_scores_get_even_summary() {
        let result = calculate_score("", "negotiation", None);
        assert!(result.summary.ends_with("Performance was even across all parameters."));
    }
}
