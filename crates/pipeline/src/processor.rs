//! Sale processor: normalize, attribute, then build and deliver the
//! conversion for approved matched sales.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use funnel_attribution::{AttributionEngine, BestMatch};
use funnel_capi::{build_conversion_payload, ConversionSink};
use funnel_core::event_bus::{make_event, noop_sink, EventSink};
use funnel_core::types::{EventType, SaleRecord, SaleStatus};
use funnel_core::{FunnelError, FunnelResult};
use funnel_sales::{normalize_sale, SaleShape};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Compact view of a match for API responses and poll summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSummary {
    pub sale_id: String,
    pub session_id: String,
    pub confidence: u8,
    pub method: String,
    pub visitor_city: Option<String>,
    pub time_diff_minutes: Option<i64>,
}

impl MatchSummary {
    pub fn from_best(best: &BestMatch) -> Self {
        Self {
            sale_id: best.result.details.transaction_id.clone(),
            session_id: best.visitor.session_id.clone(),
            confidence: best.result.confidence,
            method: best.result.method.clone(),
            visitor_city: best.visitor.geo.city.clone(),
            time_diff_minutes: best.result.details.time_diff_minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// No match, sale not approved, or no conversion sink wired.
    NotAttempted,
    Delivered {
        log_id: String,
    },
    Failed {
        kind: String,
        message: String,
        retriable: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub transaction_id: String,
    pub status: SaleStatus,
    pub pool_size: usize,
    #[serde(rename = "match")]
    pub matched: Option<MatchSummary>,
    /// The sale was matched by an earlier webhook or poll and was skipped.
    pub already_attributed: bool,
    pub delivery: DeliveryOutcome,
}

/// Transaction ids that already produced a match, oldest evicted first.
struct AttributedSales {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl AttributedSales {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, transaction_id: &str) -> bool {
        self.ids.contains(transaction_id)
    }

    /// Returns false when the id was already present.
    fn insert(&mut self, transaction_id: &str) -> bool {
        if !self.ids.insert(transaction_id.to_string()) {
            return false;
        }
        self.order.push_back(transaction_id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }
}

pub struct SaleProcessor {
    engine: Arc<AttributionEngine>,
    attributed: Mutex<AttributedSales>,
    conversions: Option<Arc<dyn ConversionSink>>,
    event_sink: Arc<dyn EventSink>,
}

impl SaleProcessor {
    /// Remembers as many attributed sales as the engine's match log holds.
    pub fn new(engine: Arc<AttributionEngine>) -> Self {
        Self {
            attributed: Mutex::new(AttributedSales::new(engine.match_log_capacity())),
            engine,
            conversions: None,
            event_sink: noop_sink(),
        }
    }

    pub fn with_conversion_sink(mut self, sink: Arc<dyn ConversionSink>) -> Self {
        self.conversions = Some(sink);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn engine(&self) -> &Arc<AttributionEngine> {
        &self.engine
    }

    /// Handle a push notification. Only a payload with no usable sale is
    /// an error; everything after normalization is reported in the outcome.
    pub async fn process_webhook(&self, raw: &Value) -> FunnelResult<ProcessOutcome> {
        let sale = normalize_sale(raw, SaleShape::Webhook).inspect_err(|e| {
            self.event_sink.emit(make_event(
                EventType::SaleMalformed,
                e.kind(),
                None,
                None,
            ));
        })?;
        Ok(self.process_sale(sale).await)
    }

    pub async fn process_sale(&self, sale: SaleRecord) -> ProcessOutcome {
        self.event_sink.emit(make_event(
            EventType::SaleReceived,
            sale.transaction_id.clone(),
            None,
            None,
        ));

        if self.attributed.lock().contains(&sale.transaction_id) {
            metrics::counter!("pipeline.sales_already_attributed").increment(1);
            debug!(transaction_id = %sale.transaction_id, "Sale already attributed, skipping");
            return ProcessOutcome {
                transaction_id: sale.transaction_id,
                status: sale.status,
                pool_size: self.engine.pool_size(),
                matched: None,
                already_attributed: true,
                delivery: DeliveryOutcome::NotAttempted,
            };
        }

        let attribution = self.engine.attribute(&sale);
        let matched = attribution.best.as_ref().map(MatchSummary::from_best);
        // A concurrent trigger may have claimed the same sale while this
        // one was scoring; only the first claimant delivers.
        let claimed = matched.is_some() && self.attributed.lock().insert(&sale.transaction_id);

        let delivery = match (&attribution.best, &self.conversions) {
            (Some(best), Some(sink)) if claimed && sale.status.is_approved() => {
                self.deliver(&sale, best, sink.as_ref()).await
            }
            _ => DeliveryOutcome::NotAttempted,
        };

        info!(
            transaction_id = %sale.transaction_id,
            status = ?sale.status,
            matched = matched.is_some(),
            confidence = matched.as_ref().map(|m| m.confidence).unwrap_or(0),
            delivery = ?delivery,
            "Sale processed"
        );

        ProcessOutcome {
            transaction_id: sale.transaction_id,
            status: sale.status,
            pool_size: attribution.pool_size,
            matched,
            already_attributed: false,
            delivery,
        }
    }

    async fn deliver(
        &self,
        sale: &SaleRecord,
        best: &BestMatch,
        sink: &dyn ConversionSink,
    ) -> DeliveryOutcome {
        let result = match build_conversion_payload(sale, &best.visitor) {
            Ok(event) => sink.send(event).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(receipt) => DeliveryOutcome::Delivered {
                log_id: receipt.log_id,
            },
            Err(e) => {
                warn!(
                    transaction_id = %sale.transaction_id,
                    error = %e,
                    retriable = e.is_retriable(),
                    "Conversion not delivered"
                );
                failed(&e)
            }
        }
    }
}

fn failed(e: &FunnelError) -> DeliveryOutcome {
    DeliveryOutcome::Failed {
        kind: e.kind().to_string(),
        message: e.to_string(),
        retriable: e.is_retriable(),
    }
}
