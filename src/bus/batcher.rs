use std::time::Duration;

use tauri::Emitter;
use tokio::sync::broadcast;
use tokio::time;

use super::event_types::should_flush_immediately;
use super::BusEvent;

const EVENTS_CHANNEL: &str = "casefile://events";
const FLUSH_INTERVAL: Duration = Duration::from_millis(100);
const MAX_BATCH: usize = 50;

/// Destination for batches of events.
pub trait EventSink: Send + 'static {
    fn deliver(&self, batch: &[BusEvent]);
}

impl EventSink for tauri::AppHandle {
    fn deliver(&self, batch: &[BusEvent]) {
        if let Err(e) = self.emit(EVENTS_CHANNEL, batch) {
            tracing::warn!("failed to emit event batch to frontend: {e}");
        }
    }
}

pub struct EventBatcher;

impl EventBatcher {
    /// Spawn a background task that forwards bus events to the Tauri frontend
    /// via `casefile://events`.
    pub fn start(
        rx: broadcast::Receiver<BusEvent>,
        app_handle: tauri::AppHandle,
    ) -> tauri::async_runtime::JoinHandle<()> {
        tauri::async_runtime::spawn(Self::forward(rx, app_handle))
    }

    /// Lifecycle and turn events go out immediately as single-element batches
    /// (after whatever is buffered, to keep ordering); narration deltas are
    /// buffered and flushed every 100ms or at 50 events. Returns when the bus
    /// closes.
    pub async fn forward<S: EventSink>(mut rx: broadcast::Receiver<BusEvent>, sink: S) {
        let mut buffer: Vec<BusEvent> = Vec::with_capacity(MAX_BATCH);
        let mut interval = time::interval(FLUSH_INTERVAL);

        loop {
            tokio::select! {
                result = rx.recv() => match result {
                    Ok(event) if should_flush_immediately(&event) => {
                        flush(&sink, &mut buffer);
                        sink.deliver(std::slice::from_ref(&event));
                    }
                    Ok(event) => {
                        buffer.push(event);
                        if buffer.len() >= MAX_BATCH {
                            flush(&sink, &mut buffer);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("event batcher lagged, dropped {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        flush(&sink, &mut buffer);
                        break;
                    }
                },
                _ = interval.tick() => flush(&sink, &mut buffer),
            }
        }
    }
}

fn flush<S: EventSink>(sink: &S, buffer: &mut Vec<BusEvent>) {
    if buffer.is_empty() {
        return;
    }
    sink.deliver(buffer);
    buffer.clear();
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::bus::event_types::{
        CATEGORY_SESSION, CATEGORY_SIM, EVENT_SESSION_STARTED, EVENT_SIM_NARRATION_DELTA,
    };
    use crate::bus::EventBus;

    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Vec<Vec<String>>>>);

    impl EventSink for RecordingSink {
        fn deliver(&self, batch: &[BusEvent]) {
            self.0
                .lock()
                .unwrap()
                .push(batch.iter().map(|e| e.event_type.clone()).collect());
        }
    }

    #[tokio::test]
    async fn buffered_deltas_are_flushed_before_immediate_event() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let sink = RecordingSink::default();
        let handle = tokio::spawn(EventBatcher::forward(rx, sink.clone()));

        bus.emit(CATEGORY_SIM, EVENT_SIM_NARRATION_DELTA, None, serde_json::json!("a"));
        bus.emit(CATEGORY_SIM, EVENT_SIM_NARRATION_DELTA, None, serde_json::json!("b"));
        bus.emit(CATEGORY_SESSION, EVENT_SESSION_STARTED, None, serde_json::json!({}));
        drop(bus);
        handle.await.unwrap();

        let batches = sink.0.lock().unwrap().clone();
        let flattened: Vec<String> = batches.iter().flatten().cloned().collect();
        assert_eq!(
            flattened,
            vec![
                EVENT_SIM_NARRATION_DELTA.to_string(),
                EVENT_SIM_NARRATION_DELTA.to_string(),
                EVENT_SESSION_STARTED.to_string(),
            ]
        );
        assert_eq!(batches.last().unwrap().len(), 1);
    }
}
