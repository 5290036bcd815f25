use chrono::Utc;
use serde_json::json;

use crate::bus::event_types::{CATEGORY_SESSION, EVENT_SESSION_ABANDONED};
use crate::bus::{emit_and_record, EventBus};
use crate::db::Database;
use crate::runtime::sessions::GameSessionManager;
use crate::runtime::state::GameStateStore;

/// Abandon sessions a previous process left active for too long.
pub fn recover(
    db: &Database,
    bus: &EventBus,
    sessions: &GameSessionManager,
    states: &GameStateStore,
) -> usize {
    let stale = match sessions.abandon_stale_sessions(Utc::now()) {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!("session recovery failed: {e}");
            return 0;
        }
    };

    for session_id in &stale {
        states.evict(session_id);
        if let Err(e) = emit_and_record(
            db,
            bus,
            CATEGORY_SESSION,
            EVENT_SESSION_ABANDONED,
            Some(session_id.clone()),
            json!({ "session_id": session_id, "reason": "stale at startup" }),
        ) {
            tracing::warn!(session_id = %session_id, "failed to record recovery event: {e}");
        }
    }
    if !stale.is_empty() {
        tracing::info!(count = stale.len(), "abandoned stale game sessions");
    }
    stale.len()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::case::CaseFile;
    use crate::core::catalog::{Difficulty, SimulationKind};
    use crate::db::queries;
    use crate::testing::seed_user;

    #[test]
    fn only_old_sessions_are_abandoned() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed_user(&db, "u1", "player");
        let old_start = (Utc::now() - chrono::Duration::hours(12)).to_rfc3339();
        queries::find_or_create_active_session(&db, "old", "u1", "posh", &old_start).unwrap();
        queries::find_or_create_active_session(&db, "fresh", "u1", "negotiation", &Utc::now().to_rfc3339())
            .unwrap();

        let bus = EventBus::new();
        let sessions = GameSessionManager::new(db.clone());
        let states = GameStateStore::new(db.clone());
        let case = CaseFile::from_model_json(
            serde_json::json!({ "title": "Tea Service", "setting": "Embassy reception" }),
            SimulationKind::PoshTraining,
            Difficulty::Easy,
        )
        .unwrap();
        states.create("old", SimulationKind::PoshTraining, Difficulty::Easy, case).unwrap();
        assert_eq!(recover(&db, &bus, &sessions, &states), 1);

        // The cached copy of the stale session is gone with it.
        queries::delete_game_state(&db, "old").unwrap();
        assert!(states.get("old").is_err());

        assert_eq!(queries::get_session(&db, "old").unwrap().unwrap().status, "abandoned");
        assert_eq!(queries::get_session(&db, "fresh").unwrap().unwrap().status, "active");
        let events = queries::list_session_events_after(&db, "old", -1).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EVENT_SESSION_ABANDONED);

        assert_eq!(recover(&db, &bus, &sessions, &states), 0);
    }
}
