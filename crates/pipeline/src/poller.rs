//! Periodic sales-history poll: the second attribution trigger.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use funnel_core::config::SalesConfig;
use funnel_core::FunnelResult;
use funnel_sales::{normalize_sales_page, SalesFeed, SalesQuery};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::processor::{MatchSummary, ProcessOutcome, SaleProcessor};

#[derive(Debug, Clone, Serialize)]
pub struct PollSummary {
    pub sales_count: usize,
    pub malformed_count: usize,
    pub visitors_count: usize,
    pub matches_count: usize,
    /// Sales in the window that an earlier poll or webhook already matched.
    pub already_attributed_count: usize,
    pub new_matches: Vec<MatchSummary>,
}

pub struct SalesPoller {
    feed: Arc<dyn SalesFeed>,
    processor: Arc<SaleProcessor>,
    lookback_hours: i64,
    max_results: u32,
}

impl SalesPoller {
    pub fn new(feed: Arc<dyn SalesFeed>, processor: Arc<SaleProcessor>, config: &SalesConfig) -> Self {
        Self {
            feed,
            processor,
            lookback_hours: config.lookback_hours,
            max_results: config.max_results,
        }
    }

    /// Fetch the recent window, then normalize and process every sale.
    ///
    /// Feed failures propagate so the caller can tell auth from transient
    /// errors; per-sale problems are folded into the summary.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> FunnelResult<PollSummary> {
        let query = SalesQuery::lookback(now, self.lookback_hours, self.max_results);
        let page = self.feed.fetch_sales(&query).await?;
        let normalized = normalize_sales_page(&page);
        let sales_count = normalized.sales.len() + normalized.malformed;

        let mut new_matches = Vec::new();
        let mut already_attributed_count = 0;
        for sale in normalized.sales {
            let outcome: ProcessOutcome = self.processor.process_sale(sale).await;
            if outcome.already_attributed {
                already_attributed_count += 1;
            }
            new_matches.extend(outcome.matched);
        }

        let summary = PollSummary {
            sales_count,
            malformed_count: normalized.malformed,
            visitors_count: self.processor.engine().pool_size(),
            matches_count: new_matches.len(),
            already_attributed_count,
            new_matches,
        };
        metrics::counter!("sales.polls").increment(1);
        Ok(summary)
    }

    /// Poll on a fixed interval until the task is aborted.
    pub fn spawn(self: Arc<Self>, interval: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.poll_once(Utc::now()).await {
                    Ok(summary) => info!(
                        sales = summary.sales_count,
                        matches = summary.matches_count,
                        malformed = summary.malformed_count,
                        "Sales poll complete"
                    ),
                    Err(e) => error!(
                        error = %e,
                        retriable = e.is_retriable(),
                        "Sales poll failed"
                    ),
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use funnel_attribution::AttributionEngine;
    use funnel_core::config::MatcherConfig;
    use funnel_core::types::{VisitorGeo, VisitorRecord};
    use funnel_core::{FunnelError, VisitorRepository};
    use funnel_tracking::InMemoryVisitorStore;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    struct FixedFeed {
        page: FunnelResult<Value>,
        queries: Mutex<Vec<SalesQuery>>,
    }

    #[async_trait]
    impl SalesFeed for FixedFeed {
        async fn fetch_sales(&self, query: &SalesQuery) -> FunnelResult<Value> {
            self.queries.lock().push(query.clone());
            match &self.page {
                Ok(page) => Ok(page.clone()),
                Err(e) => Err(FunnelError::ExternalAuth(e.to_string())),
            }
        }
    }

    fn processor(now: DateTime<Utc>) -> Arc<SaleProcessor> {
        let store: Arc<dyn VisitorRepository> = Arc::new(InMemoryVisitorStore::new());
        let at = now - Duration::minutes(4);
        store.append(VisitorRecord {
            session_id: "sess-poll".into(),
            timestamp: at,
            received_at: at,
            geo: VisitorGeo {
                ip: Some("177.1.2.3".into()),
                country_code: Some("BR".into()),
                city: Some("Natal".into()),
                ..Default::default()
            },
            page: Default::default(),
            marketing: Default::default(),
            browser_ids: Default::default(),
        });
        let engine = Arc::new(AttributionEngine::new(&MatcherConfig::default(), store));
        Arc::new(SaleProcessor::new(engine))
    }

    fn item(transaction: &str, purchase_ms: i64, city: &str) -> Value {
        json!({
            "transaction": transaction,
            "purchase_date": purchase_ms,
            "status": { "transaction_status": "APPROVED" },
            "buyer": { "address": { "city": city, "country": "Brasil" } },
            "price": { "value": 4700, "currency_value": "BRL" },
            "product": { "id": 1, "name": "Receitas" }
        })
    }

    #[tokio::test]
    async fn test_poll_once_summarizes_page() {
        let now = Utc::now();
        let feed = Arc::new(FixedFeed {
            page: Ok(json!({
                "items": [
                    item("HP1", now.timestamp_millis(), "Natal"),
                    item("HP2", (now - Duration::hours(3)).timestamp_millis(), "Natal"),
                    { "purchase_date": 1 }
                ]
            })),
            queries: Mutex::new(Vec::new()),
        });
        let poller = SalesPoller::new(feed.clone(), processor(now), &SalesConfig::default());

        let summary = poller.poll_once(now).await.unwrap();
        assert_eq!(summary.sales_count, 3);
        assert_eq!(summary.malformed_count, 1);
        assert_eq!(summary.visitors_count, 1);
        assert_eq!(summary.matches_count, 1);
        assert_eq!(summary.new_matches[0].sale_id, "HP1");
        assert_eq!(summary.new_matches[0].session_id, "sess-poll");

        let queries = feed.queries.lock();
        assert_eq!(queries[0].end - queries[0].start, Duration::hours(4));
        assert_eq!(queries[0].max_results, 100);
    }

    #[tokio::test]
    async fn test_overlapping_polls_attribute_each_sale_once() {
        let now = Utc::now();
        let feed = Arc::new(FixedFeed {
            page: Ok(json!({ "items": [item("HP1", now.timestamp_millis(), "Natal")] })),
            queries: Mutex::new(Vec::new()),
        });
        let processor = processor(now);
        let poller = SalesPoller::new(feed, processor.clone(), &SalesConfig::default());

        let first = poller.poll_once(now).await.unwrap();
        assert_eq!(first.matches_count, 1);
        assert_eq!(first.already_attributed_count, 0);

        let second = poller.poll_once(now + Duration::minutes(5)).await.unwrap();
        assert_eq!(second.sales_count, 1);
        assert_eq!(second.matches_count, 0);
        assert_eq!(second.already_attributed_count, 1);

        let stats = processor.engine().stats(now);
        assert_eq!(stats.matches.total, 1);
        assert_eq!(stats.match_rate, 100);
    }

    #[tokio::test]
    async fn test_feed_failure_propagates() {
        let now = Utc::now();
        let feed = Arc::new(FixedFeed {
            page: Err(FunnelError::ExternalAuth("expired".into())),
            queries: Mutex::new(Vec::new()),
        });
        let poller = SalesPoller::new(feed, processor(now), &SalesConfig::default());
        let err = poller.poll_once(now).await.unwrap_err();
        assert!(matches!(err, FunnelError::ExternalAuth(_)));
    }
}
