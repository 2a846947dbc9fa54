//! Storage seam for the visitor pool.
//!
//! The ingest component is the only writer, the retention sweep the only
//! deleter, and the matcher reads through `snapshot`. Records are handed out
//! as `Arc`s so an in-flight scan keeps its records alive even if the sweep
//! drops them from the store mid-scan.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::types::VisitorRecord;

pub trait VisitorRepository: Send + Sync {
    /// Append a record. The record must become visible atomically.
    fn append(&self, visitor: VisitorRecord);

    /// Records observed in `[from, to]`, in insertion order.
    fn list_within(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Arc<VisitorRecord>>;

    /// Every retained record, in insertion order.
    fn snapshot(&self) -> Vec<Arc<VisitorRecord>>;

    /// Remove records observed strictly before `cutoff`. Returns how many were removed.
    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
