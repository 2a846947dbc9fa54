//! Conversions API delivery.
//!
//! Every attempt, including ones refused for missing credentials, lands in
//! the delivery log. Failures are classified but never retried here.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use funnel_core::config::CapiConfig;
use funnel_core::event_bus::{make_event, noop_sink, EventSink};
use funnel_core::types::EventType;
use funnel_core::{FunnelError, FunnelResult};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::delivery_log::{DeliveryLog, DeliveryLogEntry, DeliveryStats, DeliveryStatus};
use crate::payload::{ConversionEnvelope, ConversionEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub log_id: String,
    pub events_received: Option<u64>,
    pub fbtrace_id: Option<String>,
}

/// Destination for built conversion events.
#[async_trait]
pub trait ConversionSink: Send + Sync {
    async fn send(&self, event: ConversionEvent) -> FunnelResult<DeliveryReceipt>;
}

pub struct CapiClient {
    http: reqwest::Client,
    config: CapiConfig,
    log: Arc<DeliveryLog>,
    event_sink: Arc<dyn EventSink>,
}

impl CapiClient {
    pub fn new(config: CapiConfig) -> FunnelResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| FunnelError::Config(format!("conversions HTTP client: {e}")))?;
        info!(
            pixel_id = %config.pixel_id,
            api_version = %config.api_version,
            token_configured = config.token_configured(),
            test_mode = config.test_event_code.is_some(),
            "Conversions API client initialized"
        );
        Ok(Self {
            http,
            log: Arc::new(DeliveryLog::new(config.max_logs)),
            config,
            event_sink: noop_sink(),
        })
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}/{}/events",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version,
            self.config.pixel_id
        )
    }

    pub fn delivery_log(&self) -> &Arc<DeliveryLog> {
        &self.log
    }

    pub fn stats(&self) -> DeliveryStats {
        self.log.stats(&self.config)
    }

    fn record_failure(&self, mut entry: DeliveryLogEntry, err: &FunnelError) {
        entry.error = Some(err.to_string());
        entry.error_kind = Some(err.kind().to_string());
        if let FunnelError::ExternalRejected { status, .. } = err {
            entry.status_code = Some(*status);
        }
        metrics::counter!("capi.events_failed").increment(1);
        self.event_sink.emit(make_event(
            EventType::ConversionFailed,
            entry.event_id.clone().unwrap_or_else(|| entry.event_name.clone()),
            None,
            None,
        ));
        self.log.push(entry);
    }

    async fn post(&self, event: ConversionEvent) -> FunnelResult<(u16, Value)> {
        let envelope = ConversionEnvelope::single(event, self.config.test_event_code.clone());
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.access_token)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    FunnelError::ExternalTransient(e.to_string())
                } else {
                    FunnelError::Internal(anyhow::anyhow!(e))
                }
            })?;

        let status = response.status().as_u16();
        // Error bodies are not always JSON.
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}

#[async_trait]
impl ConversionSink for CapiClient {
    async fn send(&self, event: ConversionEvent) -> FunnelResult<DeliveryReceipt> {
        let mut entry =
            DeliveryLogEntry::new(DeliveryStatus::Error, &event.event_name, event.event_id.as_deref());
        let log_id = entry.log_id.clone();

        if !self.config.token_configured() || self.config.pixel_id.trim().is_empty() {
            let err = FunnelError::NotConfigured("conversions API access token or pixel id".into());
            error!(event_name = %event.event_name, "Conversions API not configured");
            self.record_failure(entry, &err);
            return Err(err);
        }

        let event_name = event.event_name.clone();
        let (status, body) = match self.post(event).await {
            Ok(ok) => ok,
            Err(err) => {
                warn!(error = %err, event_name = %event_name, "Conversion delivery failed");
                self.record_failure(entry, &err);
                return Err(err);
            }
        };

        entry.status_code = Some(status);
        if (200..300).contains(&status) {
            let receipt = DeliveryReceipt {
                log_id,
                events_received: body.get("events_received").and_then(Value::as_u64),
                fbtrace_id: body
                    .get("fbtrace_id")
                    .and_then(Value::as_str)
                    .map(String::from),
            };
            entry.status = DeliveryStatus::Success;
            entry.events_received = receipt.events_received;
            entry.fbtrace_id = receipt.fbtrace_id.clone();

            metrics::counter!("capi.events_sent").increment(1);
            self.event_sink.emit(make_event(
                EventType::ConversionSent,
                entry.event_id.clone().unwrap_or_else(|| event_name.clone()),
                None,
                None,
            ));
            info!(
                event_name = %event_name,
                events_received = ?receipt.events_received,
                fbtrace_id = ?receipt.fbtrace_id,
                "Conversion delivered"
            );
            self.log.push(entry);
            return Ok(receipt);
        }

        let message = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let err = FunnelError::from_http_status(status, message);
        warn!(status, error = %err, event_name = %event_name, "Conversions API rejected event");
        self.record_failure(entry, &err);
        Err(err)
    }
}
