use serde::{Deserialize, Serialize};

use crate::core::catalog::{Difficulty, SimulationKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspect {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub alibi: String,
    #[serde(default)]
    pub motive: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clue {
    /// Filled in as `c<n>` when the model leaves it out.
    #[serde(default)]
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub location: String,
    /// Name of the suspect this clue points at, if any.
    #[serde(default)]
    pub implicates: Option<String>,
}

/// Generated scenario. `culprit` is only set for whodunits and must never be
/// sent to the player before an accusation is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFile {
    pub title: String,
    pub setting: String,
    #[serde(default)]
    pub victim: Option<String>,
    #[serde(default)]
    pub opening: String,
    #[serde(default)]
    pub suspects: Vec<Suspect>,
    #[serde(default)]
    pub clues: Vec<Clue>,
    #[serde(default)]
    pub culprit: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CaseError {
    #[error("case payload is not valid JSON: {0}")]
    Malformed(String),
    #[error("case is missing a {0}")]
    Missing(&'static str),
    #[error("culprit {0} is not one of the suspects")]
    UnknownCulprit(String),
}

impl CaseFile {
    /// Build a case from the model's JSON, filling clue ids and checking
    /// that whodunits name a culprit from the suspect list.
    pub fn from_model_json(
        value: serde_json::Value,
        kind: SimulationKind,
        difficulty: Difficulty,
    ) -> Result<Self, CaseError> {
        let mut case: CaseFile =
            serde_json::from_value(value).map_err(|e| CaseError::Malformed(e.to_string()))?;

        case.title = case.title.trim().to_string();
        if case.title.is_empty() {
            return Err(CaseError::Missing("title"));
        }
        for (i, clue) in case.clues.iter_mut().enumerate() {
            if clue.id.trim().is_empty() {
                clue.id = format!("c{}", i + 1);
            }
        }

        if kind.is_detective() {
            if case.suspects.is_empty() {
                return Err(CaseError::Missing("suspect list"));
            }
            case.suspects.truncate(difficulty.suspect_count());
            let culprit = case
                .culprit
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .ok_or(CaseError::Missing("culprit"))?;
            let matched = case
                .suspect(culprit)
                .map(|s| s.name.clone())
                .ok_or_else(|| CaseError::UnknownCulprit(culprit.to_string()))?;
            case.culprit = Some(matched);
        } else {
            case.culprit = None;
        }
        Ok(case)
    }

    /// Case-insensitive suspect lookup by name.
    pub fn suspect(&self, name: &str) -> Option<&Suspect> {
        let needle = name.trim();
        self.suspects
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(needle))
    }

    /// Lookup by id, falling back to a case-insensitive match on the
    /// description so players can type what they see.
    pub fn clue(&self, key: &str) -> Option<&Clue> {
        let needle = key.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.clues
            .iter()
            .find(|c| c.id.eq_ignore_ascii_case(&needle))
            .or_else(|| {
                self.clues
                    .iter()
                    .find(|c| c.description.to_lowercase().contains(&needle))
            })
    }
}
