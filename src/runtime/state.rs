//! Per-session game state, cached in memory and persisted as JSON.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::core::case::{CaseFile, Clue, Suspect};
use crate::core::catalog::{Difficulty, SimulationKind};
use crate::core::scoring::DecisionData;
use crate::db::{queries, Database, DbError};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("no game state for session {0}")]
    NotFound(String),
    #[error("no clue matches {0:?}")]
    UnknownClue(String),
    #[error("no suspect named {0:?}")]
    UnknownSuspect(String),
    #[error("{0}")]
    InvalidState(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("game state serialization failed: {0}")]
    Serde(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accusation {
    pub suspect: String,
    pub correct: bool,
    pub made_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub session_id: String,
    pub kind: SimulationKind,
    pub difficulty: Difficulty,
    pub case: CaseFile,
    #[serde(default)]
    pub discovered_clues: Vec<String>,
    #[serde(default)]
    pub interviewed: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub turns: u32,
    #[serde(default)]
    pub hints_used: u32,
    #[serde(default)]
    pub accusation: Option<Accusation>,
}

impl GameState {
    pub fn new(session_id: &str, kind: SimulationKind, difficulty: Difficulty, case: CaseFile) -> Self {
        Self {
            session_id: session_id.to_string(),
            kind,
            difficulty,
            case,
            discovered_clues: Vec::new(),
            interviewed: Vec::new(),
            notes: Vec::new(),
            turns: 0,
            hints_used: 0,
            accusation: None,
        }
    }

    pub fn discovered(&self) -> Vec<&Clue> {
        self.case
            .clues
            .iter()
            .filter(|c| self.discovered_clues.contains(&c.id))
            .collect()
    }

    pub fn decision_data(&self) -> DecisionData {
        DecisionData {
            correct_outcome: self.accusation.as_ref().map(|a| a.correct),
            evidence_collected: (!self.case.clues.is_empty())
                .then_some(self.discovered_clues.len() as u32),
            hints_used: Some(self.hints_used),
        }
    }
}

/// What the player is allowed to see. Undiscovered clues and the culprit
/// stay hidden until an accusation is on record.
#[derive(Debug, Clone, Serialize)]
pub struct PublicGameState {
    pub session_id: String,
    pub kind: SimulationKind,
    pub difficulty: Difficulty,
    pub title: String,
    pub setting: String,
    pub victim: Option<String>,
    pub suspects: Vec<Suspect>,
    pub discovered_clues: Vec<Clue>,
    pub total_clues: usize,
    pub interviewed: Vec<String>,
    pub notes: Vec<String>,
    pub turns: u32,
    pub hints_used: u32,
    pub accusation: Option<Accusation>,
    pub culprit: Option<String>,
}

impl From<&GameState> for PublicGameState {
    fn from(state: &GameState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            kind: state.kind,
            difficulty: state.difficulty,
            title: state.case.title.clone(),
            setting: state.case.setting.clone(),
            victim: state.case.victim.clone(),
            suspects: state.case.suspects.clone(),
            discovered_clues: state.discovered().into_iter().cloned().collect(),
            total_clues: state.case.clues.len(),
            interviewed: state.interviewed.clone(),
            notes: state.notes.clone(),
            turns: state.turns,
            hints_used: state.hints_used,
            accusation: state.accusation.clone(),
            culprit: state
                .accusation
                .as_ref()
                .and(state.case.culprit.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClueFound {
    pub clue: Clue,
    pub newly_found: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hint {
    pub text: String,
    pub hints_used: u32,
}

pub struct GameStateStore {
    db: Arc<Database>,
    states: DashMap<String, GameState>,
}

impl GameStateStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            states: DashMap::new(),
        }
    }

    pub fn create(
        &self,
        session_id: &str,
        kind: SimulationKind,
        difficulty: Difficulty,
        case: CaseFile,
    ) -> Result<GameState, StateError> {
        if self.states.contains_key(session_id) || queries::get_game_state(&self.db, session_id)?.is_some() {
            return Err(StateError::InvalidState(format!(
                "game state for session {session_id} already exists"
            )));
        }
        let state = GameState::new(session_id, kind, difficulty, case);
        self.persist(&state)?;
        self.states.insert(session_id.to_string(), state.clone());
        Ok(state)
    }

    pub fn get(&self, session_id: &str) -> Result<GameState, StateError> {
        self.ensure_loaded(session_id)?;
        self.states
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StateError::NotFound(session_id.to_string()))
    }

    pub fn public_view(&self, session_id: &str) -> Result<PublicGameState, StateError> {
        Ok(PublicGameState::from(&self.get(session_id)?))
    }

    pub fn collect_clue(&self, session_id: &str, key: &str) -> Result<ClueFound, StateError> {
        self.mutate(session_id, |state| {
            let clue = state
                .case
                .clue(key)
                .cloned()
                .ok_or_else(|| StateError::UnknownClue(key.to_string()))?;
            let newly_found = !state.discovered_clues.contains(&clue.id);
            if newly_found {
                state.discovered_clues.push(clue.id.clone());
            }
            Ok(ClueFound { clue, newly_found })
        })
    }

    pub fn interview(&self, session_id: &str, suspect: &str) -> Result<Suspect, StateError> {
        self.mutate(session_id, |state| {
            let found = state
                .case
                .suspect(suspect)
                .cloned()
                .ok_or_else(|| StateError::UnknownSuspect(suspect.to_string()))?;
            if !state.interviewed.contains(&found.name) {
                state.interviewed.push(found.name.clone());
            }
            Ok(found)
        })
    }

    pub fn add_note(&self, session_id: &str, note: &str) -> Result<usize, StateError> {
        let note = note.trim();
        if note.is_empty() {
            return Err(StateError::InvalidState("note is empty".to_string()));
        }
        self.mutate(session_id, |state| {
            state.notes.push(note.to_string());
            Ok(state.notes.len())
        })
    }

    /// Point the player at the first clue they have not found yet.
    pub fn use_hint(&self, session_id: &str) -> Result<Hint, StateError> {
        self.mutate(session_id, |state| {
            state.hints_used += 1;
            let text = match state
                .case
                .clues
                .iter()
                .find(|c| !state.discovered_clues.contains(&c.id))
            {
                Some(clue) if !clue.location.is_empty() => {
                    format!("Take a closer look around the {}.", clue.location)
                }
                Some(clue) => format!("Something about \"{}\" deserves attention.", clue.id),
                None if state.case.culprit.is_some() => {
                    "You have found every clue. Compare the alibis before you accuse.".to_string()
                }
                None => "Weigh what you know and commit to a decision.".to_string(),
            };
            Ok(Hint {
                text,
                hints_used: state.hints_used,
            })
        })
    }

    pub fn accuse(&self, session_id: &str, suspect: &str) -> Result<Accusation, StateError> {
        self.mutate(session_id, |state| {
            if let Some(existing) = &state.accusation {
                return Err(StateError::InvalidState(format!(
                    "an accusation against {} has already been made",
                    existing.suspect
                )));
            }
            let Some(culprit) = state.case.culprit.clone() else {
                return Err(StateError::InvalidState(
                    "this scenario has no accusation".to_string(),
                ));
            };
            let accused = state
                .case
                .suspect(suspect)
                .map(|s| s.name.clone())
                .ok_or_else(|| StateError::UnknownSuspect(suspect.to_string()))?;

            let accusation = Accusation {
                correct: accused == culprit,
                suspect: accused,
                made_at: Utc::now().to_rfc3339(),
            };
            state.accusation = Some(accusation.clone());
            Ok(accusation)
        })
    }

    pub fn record_turn(&self, session_id: &str) -> Result<u32, StateError> {
        self.mutate(session_id, |state| {
            state.turns += 1;
            Ok(state.turns)
        })
    }

    pub fn decision_data(&self, session_id: &str) -> Result<DecisionData, StateError> {
        Ok(self.get(session_id)?.decision_data())
    }

    /// Drop the state from memory and storage. Missing state is not an error.
    pub fn remove(&self, session_id: &str) -> Result<(), StateError> {
        self.states.remove(session_id);
        queries::delete_game_state(&self.db, session_id)?;
        Ok(())
    }

    /// Put back a snapshot taken with [`GameStateStore::get`].
    pub fn restore(&self, state: GameState) -> Result<(), StateError> {
        self.persist(&state)?;
        self.states.insert(state.session_id.clone(), state);
        Ok(())
    }

    /// Forget the cached copy only. Used once a session is closed or its
    /// rows were deleted elsewhere.
    pub fn evict(&self, session_id: &str) {
        self.states.remove(session_id);
    }

    fn ensure_loaded(&self, session_id: &str) -> Result<(), StateError> {
        if self.states.contains_key(session_id) {
            return Ok(());
        }
        let row = queries::get_game_state(&self.db, session_id)?
            .ok_or_else(|| StateError::NotFound(session_id.to_string()))?;
        let state: GameState =
            serde_json::from_str(&row.state_json).map_err(|e| StateError::Serde(e.to_string()))?;
        self.states.entry(session_id.to_string()).or_insert(state);
        Ok(())
    }

    /// Apply `f` to a copy of the state under the entry lock and keep the
    /// result only if it was persisted.
    fn mutate<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut GameState) -> Result<R, StateError>,
    ) -> Result<R, StateError> {
        self.ensure_loaded(session_id)?;
        let mut entry = self
            .states
            .get_mut(session_id)
            .ok_or_else(|| StateError::NotFound(session_id.to_string()))?;

        let mut next = entry.value().clone();
        let result = f(&mut next)?;
        self.persist(&next)?;
        *entry.value_mut() = next;
        Ok(result)
    }

    fn persist(&self, state: &GameState) -> Result<(), StateError> {
        let state_json =
            serde_json::to_string(state).map_err(|e| StateError::Serde(e.to_string()))?;
        queries::upsert_game_state(
            &self.db,
            &queries::GameStateRow {
                session_id: state.session_id.clone(),
                state_json,
                updated_at: Utc::now().to_rfc3339(),
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::testing::{seed_session, seed_user};

    fn sample_case() -> CaseFile {
        CaseFile::from_model_json(
            json!({
                "title": "The Ledger",
                "setting": "Harbor Freight Ltd.",
                "suspects": [
                    { "name": "Dana Holt", "alibi": "On leave", "motive": "Gambling debts" },
                    { "name": "Ravi Menon", "alibi": "Year-end close", "motive": "Passed over" },
                    { "name": "Ines Duarte", "alibi": "Audit prep", "motive": "None known" }
                ],
                "clues": [
                    { "id": "invoice", "description": "Duplicate vendor invoice", "location": "accounts payable", "implicates": "Dana Holt" },
                    { "id": "login", "description": "Late-night ERP login", "location": "server room" }
                ],
                "culprit": "Dana Holt"
            }),
            SimulationKind::FinancialFraud,
            Difficulty::Medium,
        )
        .unwrap()
    }

    fn store_with_state() -> (Arc<Database>, GameStateStore) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed_user(&db, "u1", "player");
        seed_session(&db, "s1", "u1", "financial_fraud");
        let store = GameStateStore::new(db.clone());
        store
            .create("s1", SimulationKind::FinancialFraud, Difficulty::Medium, sample_case())
            .unwrap();
        (db, store)
    }

    #[test]
    fn public_view_hides_culprit_until_accusation() {
        let (_db, store) = store_with_state();
        let view = store.public_view("s1").unwrap();
        assert!(view.culprit.is_none());
        assert!(view.discovered_clues.is_empty());
        assert_eq!(view.total_clues, 2);

        let accusation = store.accuse("s1", "ravi menon").unwrap();
        assert!(!accusation.correct);
        assert_eq!(accusation.suspect, "Ravi Menon");

        let view = store.public_view("s1").unwrap();
        assert_eq!(view.culprit.as_deref(), Some("Dana Holt"));
    }

    #[test]
    fn second_accusation_is_rejected() {
        let (_db, store) = store_with_state();
        assert!(store.accuse("s1", "Dana Holt").unwrap().correct);
        let err = store.accuse("s1", "Ines Duarte").unwrap_err();
        assert!(matches!(err, StateError::InvalidState(_)), "got {err:?}");
    }

    #[test]
    fn unknown_suspects_and_clues_are_errors() {
        let (_db, store) = store_with_state();
        assert!(matches!(
            store.accuse("s1", "The Butler").unwrap_err(),
            StateError::UnknownSuspect(_)
        ));
        assert!(matches!(
            store.interview("s1", "Nobody").unwrap_err(),
            StateError::UnknownSuspect(_)
        ));
        assert!(matches!(
            store.collect_clue("s1", "fingerprint").unwrap_err(),
            StateError::UnknownClue(_)
        ));
        assert!(store.get("s1").unwrap().accusation.is_none());
    }

    #[test]
    fn clues_are_collected_once() {
        let (_db, store) = store_with_state();
        assert!(store.collect_clue("s1", "invoice").unwrap().newly_found);
        assert!(!store.collect_clue("s1", "INVOICE").unwrap().newly_found);
        assert!(store.collect_clue("s1", "erp login").unwrap().newly_found);
        assert_eq!(store.get("s1").unwrap().discovered_clues, vec!["invoice", "login"]);
    }

    #[test]
    fn hints_point_at_undiscovered_clues() {
        let (_db, store) = store_with_state();
        store.collect_clue("s1", "invoice").unwrap();
        let hint = store.use_hint("s1").unwrap();
        assert_eq!(hint.hints_used, 1);
        assert!(hint.text.contains("server room"));
    }

    #[test]
    fn decision_data_reflects_play() {
        let (_db, store) = store_with_state();
        store.collect_clue("s1", "invoice").unwrap();
        store.use_hint("s1").unwrap();
        store.use_hint("s1").unwrap();
        store.accuse("s1", "Dana Holt").unwrap();
        assert_eq!(
            store.decision_data("s1").unwrap(),
            DecisionData {
                correct_outcome: Some(true),
                evidence_collected: Some(1),
                hints_used: Some(2),
            }
        );
    }

    #[test]
    fn state_survives_a_fresh_store() {
        let (db, store) = store_with_state();
        store.interview("s1", "Ines Duarte").unwrap();
        store.add_note("s1", "check the vendor master file").unwrap();
        store.record_turn("s1").unwrap();

        let reopened = GameStateStore::new(db);
        let state = reopened.get("s1").unwrap();
        assert_eq!(state.interviewed, vec!["Ines Duarte"]);
        assert_eq!(state.notes.len(), 1);
        assert_eq!(state.turns, 1);
    }

    #[test]
    fn empty_notes_and_duplicate_create_are_rejected() {
        let (_db, store) = store_with_state();
        assert!(matches!(
            store.add_note("s1", "   ").unwrap_err(),
            StateError::InvalidState(_)
        ));
        assert!(matches!(
            store
                .create("s1", SimulationKind::FinancialFraud, Difficulty::Easy, sample_case())
                .unwrap_err(),
            StateError::InvalidState(_)
        ));
    }

    #[test]
    fn remove_clears_memory_and_storage() {
        let (db, store) = store_with_state();
        store.remove("s1").unwrap();
        assert!(matches!(store.get("s1").unwrap_err(), StateError::NotFound(_)));
        assert!(queries::get_game_state(&db, "s1").unwrap().is_none());
        store.remove("s1").unwrap();
    }

    #[test]
    fn restore_undoes_later_mutations() {
        let (db, store) = store_with_state();
        let before = store.get("s1").unwrap();
        store.use_hint("s1").unwrap();
        store.accuse("s1", "Dana Holt").unwrap();

        store.restore(before.clone()).unwrap();
        assert_eq!(store.get("s1").unwrap(), before);

        store.evict("s1");
        let reloaded = store.get("s1").unwrap();
        assert_eq!(reloaded.hints_used, 0);
        assert!(reloaded.accusation.is_none());
        assert!(queries::get_game_state(&db, "s1").unwrap().is_some());
    }

    #[test]
    fn training_scenarios_cannot_accuse() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed_user(&db, "u1", "player");
        seed_session(&db, "s2", "u1", "hospital_crisis");
        let store = GameStateStore::new(db);
        let case = CaseFile::from_model_json(
            json!({ "title": "Surge", "setting": "ER" }),
            SimulationKind::HospitalCrisis,
            Difficulty::Easy,
        )
        .unwrap();
        store
            .create("s2", SimulationKind::HospitalCrisis, Difficulty::Easy, case)
            .unwrap();
        assert!(matches!(
            store.accuse("s2", "anyone").unwrap_err(),
            StateError::InvalidState(_)
        ));
        let decision = store.decision_data("s2").unwrap();
        assert_eq!(decision.correct_outcome, None);
        assert_eq!(decision.evidence_collected, None);
    }
}
