//! Attribution engine: snapshots the visitor pool, selects the best
//! visitor for a sale, and keeps the match log.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use funnel_core::config::MatcherConfig;
use funnel_core::event_bus::{make_event, noop_sink, EventSink};
use funnel_core::types::{EventType, MatchResult, SaleRecord, VisitorRecord};
use funnel_core::VisitorRepository;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::match_log::{MatchLog, MatchRecord};
use crate::scoring::{match_sale_with_visitor, ScoringWeights};
use crate::selection::{find_best_match, is_valid_sale, BestMatch};

/// Outcome of attributing one sale.
#[derive(Debug, Clone)]
pub struct Attribution {
    /// Whether the sale passed the eligibility predicate.
    pub eligible: bool,
    /// Visitors in the snapshot that was scanned.
    pub pool_size: usize,
    pub best: Option<BestMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountWindow {
    pub total: u64,
    pub last_24h: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionStats {
    pub visitors: CountWindow,
    pub matches: CountWindow,
    /// Matches per retained visitor, as a rounded percentage.
    pub match_rate: u64,
}

pub struct AttributionEngine {
    weights: ScoringWeights,
    repository: Arc<dyn VisitorRepository>,
    match_log: MatchLog,
    event_sink: Arc<dyn EventSink>,
}

impl AttributionEngine {
    pub fn new(config: &MatcherConfig, repository: Arc<dyn VisitorRepository>) -> Self {
        info!(
            window_minutes = config.time_window_minutes,
            threshold = config.match_threshold,
            "Attribution engine initialized"
        );
        Self {
            weights: ScoringWeights::from(config),
            repository,
            match_log: MatchLog::new(config.match_log_capacity),
            event_sink: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score a single pair without touching the log.
    pub fn score_pair(&self, sale: &SaleRecord, visitor: &VisitorRecord) -> MatchResult {
        match_sale_with_visitor(sale, visitor, &self.weights)
    }

    /// Find the visitor that most plausibly produced `sale`.
    ///
    /// Scoring runs over a snapshot, so concurrent eviction cannot remove
    /// a record mid-scan.
    pub fn attribute(&self, sale: &SaleRecord) -> Attribution {
        let snapshot = self.repository.snapshot();
        let eligible = is_valid_sale(sale);
        let best = if eligible {
            find_best_match(sale, &snapshot, &self.weights)
        } else {
            None
        };

        match &best {
            Some(found) => {
                self.match_log
                    .push(MatchRecord::from_best(found, Utc::now()));
                metrics::counter!("attribution.matches").increment(1);
                self.event_sink.emit(make_event(
                    EventType::MatchFound,
                    sale.transaction_id.clone(),
                    Some(found.visitor.session_id.clone()),
                    Some(found.result.confidence),
                ));
                info!(
                    transaction_id = %sale.transaction_id,
                    session_id = %found.visitor.session_id,
                    confidence = found.result.confidence,
                    time_diff_minutes = ?found.result.details.time_diff_minutes,
                    visitor_city = found.visitor.geo.city.as_deref().unwrap_or("-"),
                    method = %found.result.method,
                    "Match found"
                );
            }
            None => {
                metrics::counter!("attribution.no_match").increment(1);
                self.event_sink.emit(make_event(
                    EventType::NoMatch,
                    sale.transaction_id.clone(),
                    None,
                    None,
                ));
                debug!(
                    transaction_id = %sale.transaction_id,
                    eligible,
                    pool_size = snapshot.len(),
                    "No visitor matched sale"
                );
            }
        }

        Attribution {
            eligible,
            pool_size: snapshot.len(),
            best,
        }
    }

    /// Visitors currently retained.
    pub fn pool_size(&self) -> usize {
        self.repository.len()
    }

    pub fn match_log_capacity(&self) -> usize {
        self.match_log.capacity()
    }

    pub fn recent_matches(&self, limit: usize) -> Vec<MatchRecord> {
        self.match_log.recent(limit)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> AttributionStats {
        let since = now - Duration::hours(24);
        let visitors = self.repository.snapshot();
        let visitors_total = visitors.len() as u64;
        let visitors_recent = visitors.iter().filter(|v| v.timestamp > since).count() as u64;
        let matches_total = self.match_log.total();

        let match_rate = if visitors_total > 0 {
            (matches_total as f64 / visitors_total as f64 * 100.0).round() as u64
        } else {
            0
        };

        AttributionStats {
            visitors: CountWindow {
                total: visitors_total,
                last_24h: visitors_recent,
            },
            matches: CountWindow {
                total: matches_total,
                last_24h: self.match_log.count_since(since) as u64,
            },
            match_rate,
        }
    }
}
