//! Unified event bus: trait for emitting pipeline events from any module.
//!
//! Ingest, matching and delivery components accept an `Arc<dyn EventSink>`
//! so operator tooling can observe the funnel without coupling to it.

use crate::types::{EventType, FunnelEvent};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: FunnelEvent);
}

/// No-op sink for tests and modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: FunnelEvent) {}
}

/// Writes every event to the structured log at debug level.
pub struct TracingSink {
    node_id: String,
}

impl TracingSink {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

impl EventSink for TracingSink {
    fn emit(&self, mut event: FunnelEvent) {
        event.node_id.clone_from(&self.node_id);
        debug!(
            event_id = %event.event_id,
            event_type = ?event.event_type,
            subject_id = %event.subject_id,
            session_id = event.session_id.as_deref().unwrap_or("-"),
            confidence = ?event.confidence,
            node_id = %event.node_id,
            "Funnel event"
        );
    }
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<FunnelEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<FunnelEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: FunnelEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience builder for creating a `FunnelEvent` with minimal boilerplate.
pub fn make_event(
    event_type: EventType,
    subject_id: impl Into<String>,
    session_id: Option<String>,
    confidence: Option<u8>,
) -> FunnelEvent {
    FunnelEvent {
        event_id: Uuid::new_v4(),
        event_type,
        subject_id: subject_id.into(),
        session_id,
        confidence,
        node_id: "local".into(),
        timestamp: Utc::now(),
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn tracing_sink(node_id: impl Into<String>) -> Arc<dyn EventSink> {
    Arc::new(TracingSink::new(node_id))
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
