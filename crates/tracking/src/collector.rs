//! Visitor collector: validates inbound telemetry, appends canonical
//! visitor records to the pool and triggers the retention sweep.

use std::sync::Arc;

use chrono::Utc;
use funnel_core::event_bus::{make_event, noop_sink, EventSink};
use funnel_core::types::{EventType, VisitorRecord};
use funnel_core::{FunnelResult, VisitorRepository};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::payload::TrackingPayload;
use crate::retention::RetentionPolicy;

/// Sole writer of the visitor pool.
pub struct VisitorCollector {
    repository: Arc<dyn VisitorRepository>,
    retention: Option<RetentionPolicy>,
    event_sink: Arc<dyn EventSink>,
}

impl VisitorCollector {
    pub fn new(repository: Arc<dyn VisitorRepository>) -> Self {
        Self {
            repository,
            retention: None,
            event_sink: noop_sink(),
        }
    }

    /// Sweep stale records after every ingest.
    pub fn with_retention(mut self, policy: RetentionPolicy) -> Self {
        self.retention = Some(policy);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Record one visit from a raw JSON telemetry document.
    ///
    /// Duplicate session ids are accepted; each call is a distinct visit.
    pub fn record_visitor(&self, raw: &Value) -> FunnelResult<VisitorRecord> {
        let payload = TrackingPayload::from_json(raw).inspect_err(|e| {
            warn!(error = %e, "Rejected visitor payload");
            metrics::counter!("tracking.validation_errors").increment(1);
        })?;
        self.record_payload(payload)
    }

    pub fn record_payload(&self, payload: TrackingPayload) -> FunnelResult<VisitorRecord> {
        let visitor = payload.into_visitor(Utc::now()).inspect_err(|e| {
            warn!(error = %e, "Rejected visitor payload");
            metrics::counter!("tracking.validation_errors").increment(1);
        })?;

        self.repository.append(visitor.clone());
        metrics::counter!("tracking.visitors_recorded").increment(1);
        self.event_sink.emit(make_event(
            EventType::VisitorRecorded,
            visitor.session_id.clone(),
            Some(visitor.session_id.clone()),
            None,
        ));

        info!(
            session_id = %visitor.session_id,
            city = visitor.geo.city.as_deref().unwrap_or("-"),
            country = visitor.country_signal().unwrap_or("-"),
            timestamp = %visitor.timestamp,
            "Visitor recorded"
        );

        if let Some(policy) = &self.retention {
            let evicted = policy.sweep(self.repository.as_ref(), Utc::now());
            debug!(evicted, "Post-ingest retention sweep");
        }

        Ok(visitor)
    }

    pub fn visitor_count(&self) -> usize {
        self.repository.len()
    }

    pub fn repository(&self) -> &Arc<dyn VisitorRepository> {
        &self.repository
    }
}
