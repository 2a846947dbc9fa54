//! Sales feed: polls the payment platform's sales-history endpoint.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use funnel_core::config::SalesConfig;
use funnel_core::{FunnelError, FunnelResult};
use serde_json::Value;
use tracing::{debug, warn};

/// Time range and filters for one sales-history request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub max_results: u32,
    pub transaction_status: String,
}

impl SalesQuery {
    /// Look back `hours` from `now`.
    pub fn lookback(now: DateTime<Utc>, hours: i64, max_results: u32) -> Self {
        Self {
            start: now - Duration::hours(hours),
            end: now,
            max_results,
            transaction_status: "APPROVED".to_string(),
        }
    }

    pub fn from_config(config: &SalesConfig, now: DateTime<Utc>) -> Self {
        Self::lookback(now, config.lookback_hours, config.max_results)
    }
}

impl Default for SalesQuery {
    fn default() -> Self {
        Self::lookback(Utc::now(), 4, 100)
    }
}

/// Supplies the bearer token for platform calls.
///
/// Token refresh (client-credentials exchange) belongs behind this seam.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> FunnelResult<String>;
}

/// A fixed token from configuration.
pub struct StaticAccessToken(String);

impl StaticAccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenSource for StaticAccessToken {
    async fn access_token(&self) -> FunnelResult<String> {
        if self.0.trim().is_empty() {
            return Err(FunnelError::NotConfigured(
                "sales platform access token".into(),
            ));
        }
        Ok(self.0.clone())
    }
}

/// Source of raw sales-history pages.
#[async_trait]
pub trait SalesFeed: Send + Sync {
    async fn fetch_sales(&self, query: &SalesQuery) -> FunnelResult<Value>;
}

pub struct HotmartSalesFeed {
    client: reqwest::Client,
    base_url: String,
    token: Arc<dyn AccessTokenSource>,
}

impl HotmartSalesFeed {
    pub fn new(
        base_url: impl Into<String>,
        token: Arc<dyn AccessTokenSource>,
        timeout: StdDuration,
    ) -> FunnelResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FunnelError::Config(format!("sales HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &SalesConfig) -> FunnelResult<Self> {
        Self::new(
            config.api_base_url.clone(),
            Arc::new(StaticAccessToken::new(config.access_token.clone())),
            StdDuration::from_millis(config.timeout_ms),
        )
    }
}

#[async_trait]
impl SalesFeed for HotmartSalesFeed {
    async fn fetch_sales(&self, query: &SalesQuery) -> FunnelResult<Value> {
        let token = self.token.access_token().await?;
        let url = format!("{}/sales/history", self.base_url);

        debug!(
            start = %query.start,
            end = %query.end,
            max_results = query.max_results,
            "Fetching sales history"
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("start_date", query.start.timestamp_millis().to_string()),
                ("end_date", query.end.timestamp_millis().to_string()),
                ("max_results", query.max_results.to_string()),
                ("transaction_status", query.transaction_status.clone()),
            ])
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            metrics::counter!("sales.feed_errors").increment(1);
            warn!(status = status.as_u16(), "Sales history request failed");
            return Err(FunnelError::from_http_status(status.as_u16(), body));
        }

        let page: Value = response.json().await.map_err(|e| {
            FunnelError::ExternalRejected {
                status: status.as_u16(),
                message: format!("unreadable sales history body: {e}"),
            }
        })?;
        metrics::counter!("sales.feed_pages").increment(1);
        Ok(page)
    }
}

pub(crate) fn classify_transport_error(e: reqwest::Error) -> FunnelError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        FunnelError::ExternalTransient(e.to_string())
    } else {
        FunnelError::Internal(anyhow::anyhow!(e))
    }
}
