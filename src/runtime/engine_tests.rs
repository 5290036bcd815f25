//! SimulationEngine unit tests

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::bus::event_types::{
        EVENT_SESSION_ABANDONED, EVENT_SESSION_COMPLETED, EVENT_SESSION_STARTED,
        EVENT_SIM_EVALUATED, EVENT_SIM_NARRATION_DELTA,
    };
    use crate::bus::EventBus;
    use crate::core::catalog::{Difficulty, SimulationKind};
    use crate::core::scoring::Rating;
    use crate::db::{queries, Database};
    use crate::model::ModelError;
    use crate::runtime::engine::{
        ActionResult, EngineError, PlayerAction, SimulationEngine, MAX_PLAYER_INPUT_CHARS,
    };
    use crate::runtime::sessions::{GameSessionManager, SessionError};
    use crate::runtime::state::GameStateStore;
    use crate::testing::{seed_user, ScriptedModel};

    const CASE_JSON: &str = r#"```json
{
  "title": "Death at Marlow House",
  "setting": "A country manor during a storm",
  "victim": "Lord Marlow",
  "opening": "Narrator: Thunder rolls as you step into the hall.",
  "suspects": [
    { "name": "Edith Crane", "description": "The niece", "alibi": "Library", "motive": "Inheritance" },
    { "name": "Samuel Price", "description": "Groundskeeper", "alibi": "Walking dogs", "motive": "Debt" },
    { "name": "Nora Vance", "description": "The cook", "alibi": "Asleep", "motive": "Jealousy" }
  ],
  "clues": [
    { "id": "boot", "description": "A muddy boot print", "location": "study", "implicates": "Samuel Price" },
    { "id": "letter", "description": "A torn letter", "location": "fireplace" }
  ],
  "culprit": "Samuel Price"
}
```"#;

    const EVALUATION: &str = "You followed the physical evidence well.\n\
        Critical Thinking: 8/10\nEvidence Analysis: 7/10\nIntuition: 9/10";

    const CASE_WITHOUT_CLUE_IDS: &str = r#"{
  "title": "The Glasshouse",
  "setting": "A botanical garden after closing",
  "opening": "Rain drums on the glass roof.",
  "suspects": [
    { "name": "Priya Shah", "alibi": "Locking the gates", "motive": "Fired last week" },
    { "name": "Owen Hale", "alibi": "Greenhouse two", "motive": "Stolen research" }
  ],
  "clues": [
    { "description": "Soil on the keypad", "location": "office door", "implicates": "Owen Hale" },
    { "description": "A snapped trowel", "location": "potting bench" }
  ],
  "culprit": "Owen Hale"
}"#;

    struct Harness {
        db: Arc<Database>,
        bus: Arc<EventBus>,
        states: Arc<GameStateStore>,
        engine: SimulationEngine,
    }

    fn harness() -> Harness {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed_user(&db, "u1", "player");
        let bus = Arc::new(EventBus::new());
        let sessions = Arc::new(GameSessionManager::new(db.clone()));
        let states = Arc::new(GameStateStore::new(db.clone()));
        let engine = SimulationEngine::new(db.clone(), bus.clone(), sessions, states.clone());
        Harness {
            db,
            bus,
            states,
            engine,
        }
    }

    #[test]
    fn parses_player_commands() {
        assert_eq!(
            PlayerAction::parse("/examine  boot ").unwrap(),
            PlayerAction::Examine("boot".to_string())
        );
        assert_eq!(
            PlayerAction::parse("/Accuse Samuel Price").unwrap(),
            PlayerAction::Accuse("Samuel Price".to_string())
        );
        assert_eq!(PlayerAction::parse("/hint").unwrap(), PlayerAction::Hint);
        assert_eq!(
            PlayerAction::parse("Where were you last night?").unwrap(),
            PlayerAction::Say("Where were you last night?".to_string())
        );
        assert!(matches!(
            PlayerAction::parse("/interview").unwrap_err(),
            EngineError::InvalidInput(_)
        ));
        assert!(matches!(
            PlayerAction::parse("/dance").unwrap_err(),
            EngineError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn full_playthrough_scores_and_updates_stats() {
        let h = harness();
        let mut events = h.bus.subscribe();
        let model = ScriptedModel::new([
            CASE_JSON,
            "The print is fresh, size eleven.",
            "Samuel's shoulders sag. You were right.",
            EVALUATION,
        ]);

        let start = h
            .engine
            .begin(&model, "u1", SimulationKind::MurderMystery, Difficulty::Easy)
            .await
            .unwrap();
        assert!(!start.resumed);
        assert_eq!(start.opening, "Thunder rolls as you step into the hall.");
        assert_eq!(start.state.title, "Death at Marlow House");
        assert!(start.state.culprit.is_none());
        let session_id = start.session.id.clone();

        let turn = h
            .engine
            .play_turn(&model, &session_id, "/examine boot")
            .await
            .unwrap();
        assert_eq!(turn.player_turn.idx, 1);
        assert_eq!(turn.narrator_turn.idx, 2);
        assert!(matches!(
            turn.action,
            Some(ActionResult::ClueFound { ref clue_id, newly_found: true, .. }) if clue_id == "boot"
        ));
        let narration_req = model.last_request().unwrap();
        assert!(narration_req
            .messages
            .last()
            .unwrap()
            .content
            .contains("examined clue boot"));

        let turn = h
            .engine
            .play_turn(&model, &session_id, "/accuse samuel price")
            .await
            .unwrap();
        assert!(matches!(
            turn.action,
            Some(ActionResult::Accused { correct: true, .. })
        ));
        assert_eq!(turn.state.culprit.as_deref(), Some("Samuel Price"));

        let result = h.engine.finish(&model, &session_id).await.unwrap();
        // Correct accusation: +2 on the first parameter, +1 on the third.
        let scores: Vec<f64> = result.score.parameters.iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![10.0, 7.0, 10.0]);
        assert_eq!(result.score.overall, 90);
        assert_eq!(result.score.rating, Rating::Outstanding);
        assert_eq!(result.session.status, "completed");
        assert_eq!(result.session.score, Some(90));

        let evaluation = queries::get_evaluation(&h.db, &session_id).unwrap().unwrap();
        assert_eq!(evaluation.overall, 90);
        assert!(evaluation.raw_text.contains("Intuition: 9/10"));

        let stats = queries::get_user_stats(&h.db, "u1").unwrap().unwrap();
        assert_eq!(stats.games_played, 1);
        assert_eq!(stats.best_score, 90);
        assert_eq!(model.request_count(), 4);

        let mut types = Vec::new();
        while let Ok(event) = events.try_recv() {
            types.push(event.event_type);
        }
        assert!(types.contains(&EVENT_SESSION_STARTED.to_string()));
        assert!(types.contains(&EVENT_SIM_NARRATION_DELTA.to_string()));
        assert!(types.contains(&EVENT_SIM_EVALUATED.to_string()));
        assert_eq!(types.last().map(String::as_str), Some(EVENT_SESSION_COMPLETED));

        let recorded = queries::list_session_events_after(&h.db, &session_id, -1).unwrap();
        assert!(recorded
            .iter()
            .all(|e| e.event_type != EVENT_SIM_NARRATION_DELTA));
    }

    #[tokio::test]
    async fn begin_resumes_active_session_without_calling_model() {
        let h = harness();
        let model = ScriptedModel::new([CASE_JSON]);
        let first = h
            .engine
            .begin(&model, "u1", SimulationKind::MurderMystery, Difficulty::Medium)
            .await
            .unwrap();
        let second = h
            .engine
            .begin(&model, "u1", SimulationKind::MurderMystery, Difficulty::Medium)
            .await
            .unwrap();
        assert!(second.resumed);
        assert_eq!(second.session.id, first.session.id);
        assert_eq!(second.opening, first.opening);
        assert_eq!(model.request_count(), 1);
    }

    #[tokio::test]
    async fn unusable_case_abandons_new_session() {
        let h = harness();
        let mut events = h.bus.subscribe();
        let model = ScriptedModel::new(["I'd rather not."]);
        let err = h
            .engine
            .begin(&model, "u1", SimulationKind::MurderMystery, Difficulty::Easy)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidCase(_)), "got {err:?}");

        let sessions = queries::list_sessions_for_user(&h.db, "u1").unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, "abandoned");
        assert_eq!(events.try_recv().unwrap().event_type, EVENT_SESSION_ABANDONED);
    }

    #[tokio::test]
    async fn model_failure_during_setup_abandons_session() {
        let h = harness();
        let model = ScriptedModel::default();
        model.push_error(ModelError::RateLimited("slow down".to_string()));
        let err = h
            .engine
            .begin(&model, "u1", SimulationKind::FakeNews, Difficulty::Easy)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Model(ModelError::RateLimited(_))));
        assert!(queries::get_active_session(&h.db, "u1", "fake_news")
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_the_model() {
        let h = harness();
        let model = ScriptedModel::new([CASE_JSON]);
        let start = h
            .engine
            .begin(&model, "u1", SimulationKind::MurderMystery, Difficulty::Easy)
            .await
            .unwrap();

        let err = h.engine.play_turn(&model, &start.session.id, "   ").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let long = "a".repeat(MAX_PLAYER_INPUT_CHARS + 1);
        let err = h.engine.play_turn(&model, &start.session.id, &long).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        assert_eq!(model.request_count(), 1);
        assert_eq!(queries::list_turns(&h.db, &start.session.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_clue_becomes_rejected_action() {
        let h = harness();
        let model = ScriptedModel::new([CASE_JSON, "You search, but find nothing of the sort."]);
        let start = h
            .engine
            .begin(&model, "u1", SimulationKind::MurderMystery, Difficulty::Easy)
            .await
            .unwrap();
        let turn = h
            .engine
            .play_turn(&model, &start.session.id, "/examine candlestick")
            .await
            .unwrap();
        assert!(matches!(turn.action, Some(ActionResult::Rejected { .. })));
        assert!(turn.state.discovered_clues.is_empty());
    }

    #[tokio::test]
    async fn finished_sessions_cannot_be_played_or_finished_again() {
        let h = harness();
        let model = ScriptedModel::new([CASE_JSON, EVALUATION]);
        let start = h
            .engine
            .begin(&model, "u1", SimulationKind::MurderMystery, Difficulty::Easy)
            .await
            .unwrap();
        let result = h.engine.finish(&model, &start.session.id).await.unwrap();
        // No accusation and no clues: only the zero-evidence nudge applies.
        let scores: Vec<f64> = result.score.parameters.iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![8.0, 6.0, 9.0]);

        let err = h.engine.finish(&model, &start.session.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Session(SessionError::InvalidState(_))));
        let err = h
            .engine
            .play_turn(&model, &start.session.id, "hello?")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Session(SessionError::InvalidState(_))));
    }

    #[tokio::test]
    async fn abandon_emits_once() {
        let h = harness();
        let model = ScriptedModel::new([CASE_JSON]);
        let start = h
            .engine
            .begin(&model, "u1", SimulationKind::MurderMystery, Difficulty::Easy)
            .await
            .unwrap();
        assert!(h.engine.abandon(&start.session.id).unwrap());
        assert!(!h.engine.abandon(&start.session.id).unwrap());
        let abandoned = queries::list_session_events_after(&h.db, &start.session.id, -1)
            .unwrap()
            .into_iter()
            .filter(|e| e.event_type == EVENT_SESSION_ABANDONED)
            .count();
        assert_eq!(abandoned, 1);
    }

    #[tokio::test]
    async fn generated_clues_without_ids_are_numbered() {
        let h = harness();
        let model = ScriptedModel::new([CASE_WITHOUT_CLUE_IDS, "The keypad is gritty."]);
        let start = h
            .engine
            .begin(&model, "u1", SimulationKind::MurderMystery, Difficulty::Hard)
            .await
            .unwrap();
        assert_eq!(start.state.total_clues, 2);

        let turn = h
            .engine
            .play_turn(&model, &start.session.id, "/examine soil")
            .await
            .unwrap();
        assert!(matches!(
            turn.action,
            Some(ActionResult::ClueFound { ref clue_id, .. }) if clue_id == "c1"
        ));
        let state = h.states.get(&start.session.id).unwrap();
        assert_eq!(
            state.case.clues.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["c1", "c2"]
        );
    }

    #[tokio::test]
    async fn failed_narration_leaves_the_turn_unapplied() {
        let h = harness();
        let model = ScriptedModel::new([CASE_JSON]);
        model.push_error(ModelError::RateLimited("slow down".to_string()));
        model.push_error(ModelError::RateLimited("slow down".to_string()));
        let start = h
            .engine
            .begin(&model, "u1", SimulationKind::MurderMystery, Difficulty::Easy)
            .await
            .unwrap();
        let session_id = start.session.id.clone();

        for input in ["/hint", "/accuse Samuel Price"] {
            let err = h.engine.play_turn(&model, &session_id, input).await.unwrap_err();
            assert!(matches!(err, EngineError::Model(ModelError::RateLimited(_))), "got {err:?}");
        }

        let state = h.states.get(&session_id).unwrap();
        assert_eq!(state.hints_used, 0);
        assert!(state.accusation.is_none());
        assert_eq!(state.turns, 0);
        let turns = queries::list_turns(&h.db, &session_id).unwrap();
        assert_eq!(
            turns.iter().map(|t| t.role.as_str()).collect::<Vec<_>>(),
            vec!["narrator"]
        );

        // Storage holds the rolled-back state too.
        h.states.evict(&session_id);
        assert_eq!(h.states.get(&session_id).unwrap().hints_used, 0);

        // The accusation can still be made once the narrator answers.
        let model = ScriptedModel::new(["Samuel bolts for the door."]);
        let turn = h
            .engine
            .play_turn(&model, &session_id, "/accuse Samuel Price")
            .await
            .unwrap();
        assert!(matches!(turn.action, Some(ActionResult::Accused { correct: true, .. })));
        assert_eq!(turn.player_turn.idx, 1);
    }

    #[tokio::test]
    async fn closed_sessions_drop_their_cached_state() {
        let h = harness();
        let model = ScriptedModel::new([CASE_JSON, EVALUATION]);
        let finished = h
            .engine
            .begin(&model, "u1", SimulationKind::MurderMystery, Difficulty::Easy)
            .await
            .unwrap();
        h.engine.finish(&model, &finished.session.id).await.unwrap();
        queries::delete_game_state(&h.db, &finished.session.id).unwrap();
        assert!(h.states.get(&finished.session.id).is_err());

        let model = ScriptedModel::new([CASE_JSON]);
        let abandoned = h
            .engine
            .begin(&model, "u1", SimulationKind::MurderMystery, Difficulty::Easy)
            .await
            .unwrap();
        assert!(h.engine.abandon(&abandoned.session.id).unwrap());
        queries::delete_game_state(&h.db, &abandoned.session.id).unwrap();
        assert!(h.states.get(&abandoned.session.id).is_err());
    }
}
