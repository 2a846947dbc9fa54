//! REST API handlers for visitor tracking, sale intake, attribution
//! diagnostics, conversion delivery and operational endpoints.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use funnel_attribution::AttributionStats;
use funnel_capi::{frontend_to_conversion, CapiClient, ConversionSink, DeliveryLogEntry, DeliveryStats};
use funnel_core::types::{MatchResult, SaleRecord, VisitorRecord};
use funnel_core::FunnelError;
use funnel_pipeline::{PollSummary, ProcessOutcome, SaleProcessor, SalesPoller};
use funnel_sales::{normalize_sale, SaleShape};
use funnel_tracking::VisitorCollector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Default and maximum page size for the delivery log endpoint.
const DEFAULT_LOG_LIMIT: usize = 20;
const MAX_LOG_LIMIT: usize = 100;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<VisitorCollector>,
    pub processor: Arc<SaleProcessor>,
    pub poller: Option<Arc<SalesPoller>>,
    pub capi: Arc<CapiClient>,
    pub node_id: String,
    pub start_time: Instant,
}

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

/// Maps the error taxonomy onto HTTP statuses.
pub struct ApiError(pub FunnelError);

impl From<FunnelError> for ApiError {
    fn from(e: FunnelError) -> Self {
        Self(e)
    }
}

fn status_for(e: &FunnelError) -> StatusCode {
    match e {
        FunnelError::Validation(_) | FunnelError::MalformedSale(_) => StatusCode::BAD_REQUEST,
        FunnelError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
        FunnelError::ExternalAuth(_) | FunnelError::ExternalRejected { .. } => {
            StatusCode::BAD_GATEWAY
        }
        FunnelError::ExternalTransient(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "Request failed");
            metrics::counter!("api.errors").increment(1);
            "Internal processing error".to_string()
        } else {
            if status == StatusCode::BAD_REQUEST {
                metrics::counter!("api.validation_errors").increment(1);
            }
            warn!(error = %self.0, status = status.as_u16(), "Request rejected");
            self.0.to_string()
        };
        (
            status,
            Json(ErrorResponse {
                success: false,
                error: self.0.kind().to_string(),
                message,
            }),
        )
            .into_response()
    }
}

// ─── Tracking ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct VisitorAccepted {
    pub success: bool,
    pub session_id: String,
    pub total_visitors: usize,
}

/// POST /api/tracking/visitor
pub async fn record_visitor(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> Result<Json<VisitorAccepted>, ApiError> {
    let visitor = state.collector.record_visitor(&raw)?;
    Ok(Json(VisitorAccepted {
        success: true,
        session_id: visitor.session_id,
        total_visitors: state.collector.visitor_count(),
    }))
}

// ─── Sales ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct WebhookAccepted {
    pub success: bool,
    pub outcome: ProcessOutcome,
}

/// POST /api/hotmart/webhook
pub async fn sale_webhook(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> Result<Json<WebhookAccepted>, ApiError> {
    let outcome = state.processor.process_webhook(&raw).await?;
    Ok(Json(WebhookAccepted {
        success: true,
        outcome,
    }))
}

#[derive(Serialize)]
pub struct CheckSalesResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: PollSummary,
}

/// GET /api/hotmart/check-sales: run one poll now.
pub async fn check_sales(
    State(state): State<AppState>,
) -> Result<Json<CheckSalesResponse>, ApiError> {
    let poller = state
        .poller
        .as_ref()
        .ok_or_else(|| FunnelError::NotConfigured("sales platform polling".into()))?;
    let summary = poller.poll_once(Utc::now()).await?;
    Ok(Json(CheckSalesResponse {
        success: true,
        summary,
    }))
}

/// GET /api/hotmart/stats
pub async fn attribution_stats(State(state): State<AppState>) -> Json<AttributionStats> {
    Json(state.processor.engine().stats(Utc::now()))
}

// ─── Diagnostics ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TestMatchRequest {
    pub sale: Value,
    #[serde(alias = "visitorIndex")]
    pub visitor_index: usize,
    #[serde(default)]
    pub shape: Option<SaleShape>,
}

#[derive(Serialize)]
pub struct TestMatchResponse {
    pub success: bool,
    pub visitor: VisitorRecord,
    pub sale: SaleRecord,
    pub match_result: MatchResult,
}

/// POST /api/debug/test-match: score one sale against one pool entry.
pub async fn test_match(
    State(state): State<AppState>,
    Json(request): Json<TestMatchRequest>,
) -> Result<Json<TestMatchResponse>, ApiError> {
    let pool = state.collector.repository().snapshot();
    let visitor = pool.get(request.visitor_index).ok_or_else(|| {
        FunnelError::Validation(format!(
            "visitor index {} out of range ({} visitors)",
            request.visitor_index,
            pool.len()
        ))
    })?;
    let sale = normalize_sale(&request.sale, request.shape.unwrap_or(SaleShape::Polling))?;
    let match_result = state.processor.engine().score_pair(&sale, visitor);

    Ok(Json(TestMatchResponse {
        success: true,
        visitor: visitor.as_ref().clone(),
        sale,
        match_result,
    }))
}

// ─── Conversions API ────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventForwarded {
    pub success: bool,
    pub log_id: String,
    pub events_received: Option<u64>,
}

/// POST /api/events/facebook: forward a browser pixel event server-side.
pub async fn forward_frontend_event(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> Result<Json<EventForwarded>, ApiError> {
    let event = frontend_to_conversion(&raw, Utc::now())?;
    let receipt = state.capi.send(event).await?;
    Ok(Json(EventForwarded {
        success: true,
        log_id: receipt.log_id,
        events_received: receipt.events_received,
    }))
}

/// GET /api/capi/stats
pub async fn capi_stats(State(state): State<AppState>) -> Json<DeliveryStats> {
    Json(state.capi.stats())
}

#[derive(Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct LogsResponse {
    pub success: bool,
    pub logs: Vec<DeliveryLogEntry>,
    pub total: usize,
}

/// GET /api/capi/logs?limit=N: newest first.
pub async fn capi_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<LogsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);
    let log = state.capi.delivery_log();
    Json(LogsResponse {
        success: true,
        logs: log.recent(limit),
        total: log.len(),
    })
}

// ─── Operational ────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub visitors: usize,
}

/// GET /health. Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        visitors: state.collector.visitor_count(),
    })
}

/// GET /ready. Readiness probe.
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live. Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::server::router;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use funnel_attribution::AttributionEngine;
    use funnel_core::config::{CapiConfig, MatcherConfig};
    use funnel_core::VisitorRepository;
    use funnel_tracking::InMemoryVisitorStore;
    use serde_json::json;
    use tower::ServiceExt;

    fn state() -> AppState {
        let store: Arc<dyn VisitorRepository> = Arc::new(InMemoryVisitorStore::new());
        let capi = Arc::new(CapiClient::new(CapiConfig::default()).unwrap());
        let engine = Arc::new(AttributionEngine::new(&MatcherConfig::default(), store.clone()));
        AppState {
            collector: Arc::new(VisitorCollector::new(store)),
            processor: Arc::new(SaleProcessor::new(engine).with_conversion_sink(capi.clone())),
            poller: None,
            capi,
            node_id: "test-node".into(),
            start_time: Instant::now(),
        }
    }

    async fn call(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn visitor_body() -> Value {
        json!({
            "external_id": "sess-api",
            "timestamp": Utc::now().to_rfc3339(),
            "visitor_data": { "ip": "200.1.2.3", "city": "Recife", "country_code": "BR", "region_name": "Pernambuco" }
        })
    }

    fn webhook_body() -> Value {
        json!({
            "body": { "event": "PURCHASE_APPROVED", "data": {
                "purchase": { "transaction": "HP-API", "order_date": Utc::now().timestamp_millis(), "status": "APPROVED",
                              "price": { "value": 19.9 } },
                "buyer": { "email": "x@example.com", "address": { "city": "Recife", "country": "Brasil" } },
                "product": { "id": 1 }
            }}
        })
    }

    #[tokio::test]
    async fn test_visitor_ingest_and_validation() {
        let state = state();
        let (status, body) = call(&state, "POST", "/api/tracking/visitor", Some(visitor_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session_id"], "sess-api");
        assert_eq!(body["total_visitors"], 1);

        let (status, body) = call(
            &state,
            "POST",
            "/api/tracking/visitor",
            Some(json!({ "visitor_data": { "city": "Recife" } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
    }

    #[tokio::test]
    async fn test_webhook_matches_and_reports_unconfigured_delivery() {
        let state = state();
        call(&state, "POST", "/api/tracking/visitor", Some(visitor_body())).await;

        let (status, body) = call(&state, "POST", "/api/hotmart/webhook", Some(webhook_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"]["match"]["session_id"], "sess-api");
        assert_eq!(body["outcome"]["delivery"]["outcome"], "failed");
        assert_eq!(body["outcome"]["delivery"]["kind"], "not_configured");

        let (_, stats) = call(&state, "GET", "/api/hotmart/stats", None).await;
        assert_eq!(stats["matches"]["total"], 1);
        assert_eq!(stats["match_rate"], 100);

        let (_, logs) = call(&state, "GET", "/api/capi/logs?limit=5", None).await;
        assert_eq!(logs["total"], 1);
        assert_eq!(logs["logs"][0]["status"], "error");
    }

    #[tokio::test]
    async fn test_webhook_without_sale_data_is_bad_request() {
        let (status, body) =
            call(&state(), "POST", "/api/hotmart/webhook", Some(json!({ "body": {} }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "malformed_sale");
    }

    #[tokio::test]
    async fn test_check_sales_without_poller_is_unavailable() {
        let (status, body) = call(&state(), "GET", "/api/hotmart/check-sales", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "not_configured");
    }

    #[tokio::test]
    async fn test_debug_match_scores_one_pair() {
        let state = state();
        call(&state, "POST", "/api/tracking/visitor", Some(visitor_body())).await;
        let sale = json!({
            "transaction": "HP-DBG",
            "purchase_date": "not-a-date",
            "status": { "transaction_status": "APPROVED" },
            "buyer": { "address": { "city": "Recife", "country": "BR" } }
        });

        let (status, body) = call(
            &state,
            "POST",
            "/api/debug/test-match",
            Some(json!({ "sale": sale, "visitorIndex": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["match_result"]["method"], "error-invalid-dates");
        assert_eq!(body["match_result"]["confidence"], 0);

        let (status, _) = call(
            &state,
            "POST",
            "/api/debug/test-match",
            Some(json!({ "sale": sale, "visitor_index": 7 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_frontend_event_without_token_is_unavailable() {
        let state = state();
        let (status, body) = call(
            &state,
            "POST",
            "/api/events/facebook",
            Some(json!({ "eventType": "PageView", "sessionId": "s1" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "not_configured");

        let (_, stats) = call(&state, "GET", "/api/capi/stats", None).await;
        assert_eq!(stats["failed_events"], 1);
        assert_eq!(stats["config_status"]["access_token_configured"], false);
    }

    #[tokio::test]
    async fn test_operational_endpoints() {
        let state = state();
        let (status, body) = call(&state, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["node_id"], "test-node");

        assert_eq!(call(&state, "GET", "/ready", None).await.0, StatusCode::OK);
        assert_eq!(call(&state, "GET", "/live", None).await.0, StatusCode::OK);
    }
}
