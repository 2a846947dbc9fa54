//! Bounded in-memory history of confirmed matches, used for statistics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::selection::BestMatch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub transaction_id: String,
    pub session_id: String,
    pub confidence: u8,
    pub method: String,
    pub time_diff_minutes: Option<i64>,
    pub visitor_city: Option<String>,
    pub matched_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn from_best(best: &BestMatch, matched_at: DateTime<Utc>) -> Self {
        Self {
            transaction_id: best.result.details.transaction_id.clone(),
            session_id: best.visitor.session_id.clone(),
            confidence: best.result.confidence,
            method: best.result.method.clone(),
            time_diff_minutes: best.result.details.time_diff_minutes,
            visitor_city: best.visitor.geo.city.clone(),
            matched_at,
        }
    }
}

/// Oldest entries drop off once `capacity` is reached; the all-time
/// counter keeps growing.
pub struct MatchLog {
    records: RwLock<VecDeque<MatchRecord>>,
    capacity: usize,
    total: AtomicU64,
}

impl MatchLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            total: AtomicU64::new(0),
        }
    }

    pub fn push(&self, record: MatchRecord) {
        let mut records = self.records.write();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Matches recorded strictly after `since`.
    pub fn count_since(&self, since: DateTime<Utc>) -> usize {
        self.records
            .read()
            .iter()
            .filter(|r| r.matched_at > since)
            .count()
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<MatchRecord> {
        self.records
            .read()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}
