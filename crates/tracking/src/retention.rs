//! Retention sweep: drops visitor records older than the horizon.
//!
//! Best-effort housekeeping. Runs after every ingest and from a periodic
//! background task; a record that survives a little longer only risks a
//! late match, never a crash.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use funnel_core::config::RetentionConfig;
use funnel_core::event_bus::{make_event, noop_sink, EventSink};
use funnel_core::types::EventType;
use funnel_core::VisitorRepository;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Clone)]
pub struct RetentionPolicy {
    horizon: Duration,
    event_sink: Arc<dyn EventSink>,
}

impl RetentionPolicy {
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon,
            event_sink: noop_sink(),
        }
    }

    pub fn from_config(config: &RetentionConfig) -> Self {
        Self::new(Duration::hours(config.horizon_hours))
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// Oldest timestamp still retained at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.horizon
    }

    /// Evict everything older than the horizon. Returns the number removed.
    pub fn sweep(&self, repository: &dyn VisitorRepository, now: DateTime<Utc>) -> usize {
        let evicted = repository.evict_older_than(self.cutoff(now));
        if evicted > 0 {
            metrics::counter!("tracking.visitors_evicted").increment(evicted as u64);
            self.event_sink.emit(make_event(
                EventType::VisitorsEvicted,
                evicted.to_string(),
                None,
                None,
            ));
            info!(
                evicted,
                remaining = repository.len(),
                "Retention sweep removed stale visitors"
            );
        }
        evicted
    }

    /// Spawn a periodic sweep on the current tokio runtime.
    pub fn spawn_sweeper(
        self,
        repository: Arc<dyn VisitorRepository>,
        interval: StdDuration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let evicted = self.sweep(repository.as_ref(), Utc::now());
                debug!(evicted, "Periodic retention sweep complete");
            }
        })
    }
}
