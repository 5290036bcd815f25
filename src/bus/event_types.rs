//! Event type and category constants and flush policy.
//!
//! Single source of truth for which events are "immediate" (flushed to the
//! frontend without batching) vs batched.

use super::event_bus::BusEvent;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

pub const CATEGORY_SESSION: &str = "session";
pub const CATEGORY_SIM: &str = "sim";

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

pub const EVENT_SESSION_STARTED: &str = "session.started";
pub const EVENT_SESSION_COMPLETED: &str = "session.completed";
pub const EVENT_SESSION_ABANDONED: &str = "session.abandoned";
pub const EVENT_SIM_TURN: &str = "sim.turn";
pub const EVENT_SIM_NARRATION_DELTA: &str = "sim.narration_delta";
pub const EVENT_SIM_EVALUATED: &str = "sim.evaluated";

// ---------------------------------------------------------------------------
// Flush policy
// ---------------------------------------------------------------------------

/// Returns true if this event should be sent to the frontend immediately
/// instead of being buffered. Only narration deltas are batched.
pub fn should_flush_immediately(event: &BusEvent) -> bool {
    if event.category == CATEGORY_SESSION {
        return true;
    }
    event.event_type != EVENT_SIM_NARRATION_DELTA
}
