//! Bounded log of conversion deliveries and the stats derived from it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use funnel_core::config::CapiConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub log_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub event_name: String,
    pub event_id: Option<String>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub events_received: Option<u64>,
    pub fbtrace_id: Option<String>,
}

impl DeliveryLogEntry {
    pub fn new(status: DeliveryStatus, event_name: &str, event_id: Option<&str>) -> Self {
        let now = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            log_id: format!("capi_{}_{}", now.timestamp_millis(), &suffix[..9]),
            timestamp: now,
            status,
            event_name: event_name.to_string(),
            event_id: event_id.map(String::from),
            status_code: None,
            error: None,
            error_kind: None,
            events_received: None,
            fbtrace_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigStatus {
    pub access_token_configured: bool,
    pub pixel_id: String,
    pub api_version: String,
}

impl From<&CapiConfig> for ConfigStatus {
    fn from(config: &CapiConfig) -> Self {
        Self {
            access_token_configured: config.token_configured(),
            pixel_id: config.pixel_id.clone(),
            api_version: config.api_version.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub total_events: usize,
    pub successful_events: usize,
    pub failed_events: usize,
    /// One decimal place, e.g. `"66.7%"`; `"0%"` when empty.
    pub success_rate: String,
    pub last_event_time: Option<DateTime<Utc>>,
    pub config_status: ConfigStatus,
}

pub struct DeliveryLog {
    entries: Mutex<VecDeque<DeliveryLogEntry>>,
    capacity: usize,
}

impl DeliveryLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, entry: DeliveryLogEntry) {
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<DeliveryLogEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn stats(&self, config: &CapiConfig) -> DeliveryStats {
        let entries = self.entries.lock();
        let total = entries.len();
        let successful = entries
            .iter()
            .filter(|e| e.status == DeliveryStatus::Success)
            .count();
        let success_rate = if total > 0 {
            format!("{:.1}%", successful as f64 / total as f64 * 100.0)
        } else {
            "0%".to_string()
        };

        DeliveryStats {
            total_events: total,
            successful_events: successful,
            failed_events: total - successful,
            success_rate,
            last_event_time: entries.back().map(|e| e.timestamp),
            config_status: ConfigStatus::from(config),
        }
    }
}
