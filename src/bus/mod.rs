//! Real-time event plumbing between the simulation backend and the UI.
//!
//! Events flow from backend → EventBus → EventBatcher → Frontend:
//! - `EventBus`: in-memory broadcast channel for immediate distribution
//! - `EventBatcher`: buffers narration deltas before sending to the UI
//! - `record`: persists an event next to publishing it, so a reloaded UI
//!   can replay a session's history

mod batcher;
mod event_bus;
pub mod event_types;

pub use batcher::EventBatcher;
pub use event_bus::{BusEvent, EventBus};

use crate::db::{queries, Database, DbError};

/// Publish an event and store it in the `events` table.
pub fn emit_and_record(
    db: &Database,
    bus: &EventBus,
    category: &str,
    event_type: &str,
    session_id: Option<String>,
    payload: serde_json::Value,
) -> Result<BusEvent, DbError> {
    let event = bus.emit(category, event_type, session_id, payload);
    queries::insert_event(
        db,
        &queries::EventRow {
            id: event.id.clone(),
            session_id: event.session_id.clone(),
            seq: event.seq,
            category: event.category.clone(),
            event_type: event.event_type.clone(),
            payload_json: event.payload.to_string(),
            created_at: event.created_at.clone(),
        },
    )?;
    Ok(event)
}
