//! In-process visitor pool. Readers get `Arc` snapshots, so a scan never
//! observes a partially appended record and eviction never frees a record a
//! scan still holds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use funnel_core::types::VisitorRecord;
use funnel_core::VisitorRepository;
use parking_lot::RwLock;

#[derive(Default)]
pub struct InMemoryVisitorStore {
    records: RwLock<Vec<Arc<VisitorRecord>>>,
}

impl InMemoryVisitorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VisitorRepository for InMemoryVisitorStore {
    fn append(&self, visitor: VisitorRecord) {
        let record = Arc::new(visitor);
        self.records.write().push(record);
    }

    fn list_within(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Arc<VisitorRecord>> {
        self.records
            .read()
            .iter()
            .filter(|v| v.timestamp >= from && v.timestamp <= to)
            .cloned()
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<VisitorRecord>> {
        self.records.read().clone()
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|v| v.timestamp >= cutoff);
        before - records.len()
    }

    fn len(&self) -> usize {
        self.records.read().len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn visitor(session_id: &str, timestamp: DateTime<Utc>) -> VisitorRecord {
        VisitorRecord {
            session_id: session_id.into(),
            timestamp,
            received_at: timestamp,
            geo: Default::default(),
            page: Default::default(),
            marketing: Default::default(),
            browser_ids: Default::default(),
        }
    }

    #[test]
    fn test_append_preserves_order_and_duplicates() {
        let store = InMemoryVisitorStore::new();
        let now = Utc::now();
        store.append(visitor("a", now));
        store.append(visitor("b", now));
        store.append(visitor("a", now));

        let ids: Vec<_> = store.snapshot().iter().map(|v| v.session_id.clone()).collect();
        assert_eq!(ids, vec!["a", "b", "a"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_list_within_is_inclusive() {
        let store = InMemoryVisitorStore::new();
        let now = Utc::now();
        store.append(visitor("old", now - Duration::hours(3)));
        store.append(visitor("edge", now - Duration::hours(1)));
        store.append(visitor("fresh", now));

        let within = store.list_within(now - Duration::hours(1), now);
        let ids: Vec<_> = within.iter().map(|v| v.session_id.as_str()).collect();
        assert_eq!(ids, vec!["edge", "fresh"]);
    }

    #[test]
    fn test_evict_keeps_snapshot_alive() {
        let store = InMemoryVisitorStore::new();
        let now = Utc::now();
        store.append(visitor("stale", now - Duration::hours(30)));
        store.append(visitor("fresh", now));

        let snapshot = store.snapshot();
        let evicted = store.evict_older_than(now - Duration::hours(24));

        assert_eq!(evicted, 1);
        assert_eq!(store.len(), 1);
        // The in-flight scan still sees both records.
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].session_id, "stale");
    }
}
