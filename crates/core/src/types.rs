use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trim an optional string and drop it when blank.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ─── Visitor ────────────────────────────────────────────────────────────────

/// One observed browsing session. Created on ingest and never mutated;
/// removed only by the retention sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorRecord {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub geo: VisitorGeo,
    #[serde(default)]
    pub page: PageContext,
    #[serde(default)]
    pub marketing: MarketingAttribution,
    #[serde(default)]
    pub browser_ids: BrowserIds,
}

/// Network and geolocation signals resolved by the front end's geo lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitorGeo {
    pub ip: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region_name: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
    pub currency: Option<String>,
    pub isp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub url: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

/// UTM parameters; carried for reporting, never scored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketingAttribution {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub utm_term: Option<String>,
}

/// Ad-platform browser identifiers (`_fbp` / `_fbc` cookies).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserIds {
    pub fbp: Option<String>,
    pub fbc: Option<String>,
}

impl VisitorRecord {
    /// Country signal used for matching: full name first, then ISO code.
    pub fn country_signal(&self) -> Option<&str> {
        self.geo
            .country
            .as_deref()
            .or(self.geo.country_code.as_deref())
    }
}

// ─── Sale ───────────────────────────────────────────────────────────────────

/// Canonical purchase event produced by the sale normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub transaction_id: String,
    /// Parsed purchase time; `None` when the platform sent an unparsable date.
    pub purchase_time: Option<DateTime<Utc>>,
    /// Purchase time exactly as received, kept for audit.
    pub purchase_time_raw: String,
    pub status: SaleStatus,
    #[serde(default)]
    pub buyer: Buyer,
    #[serde(default)]
    pub product: Product,
    pub price: Option<Price>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Approved,
    Canceled,
    Other(String),
}

impl SaleStatus {
    /// Map a platform transaction status string onto the canonical status.
    pub fn from_platform(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "APPROVED" | "COMPLETE" | "COMPLETED" => SaleStatus::Approved,
            "CANCELED" | "CANCELLED" => SaleStatus::Canceled,
            other => SaleStatus::Other(other.to_string()),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, SaleStatus::Approved)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub address: BuyerAddress,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerAddress {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Monetary value in minor units (cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub amount_minor: i64,
    pub currency: String,
}

impl Price {
    /// Decimal amount in major currency units.
    pub fn amount(&self) -> f64 {
        self.amount_minor as f64 / 100.0
    }
}

// ─── Match ──────────────────────────────────────────────────────────────────

/// Outcome of scoring one (sale, visitor) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    /// 0..=100.
    pub confidence: u8,
    pub method: String,
    pub details: MatchDetails,
}

/// Explanation of a score, populated for matches and non-matches alike.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchDetails {
    pub transaction_id: String,
    pub session_id: String,
    /// Absolute minutes between purchase and visit; `None` when dates are invalid.
    pub time_diff_minutes: Option<i64>,
    pub sale_time: String,
    pub visitor_time: String,
    pub time_match: bool,
    pub time_window_exceeded: bool,
    pub country_match: bool,
    pub state_match: bool,
    pub city_match: bool,
    pub time_proximity: Option<TimeProximity>,
    pub visitor_data: VisitorAudit,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeProximity {
    VeryClose,
    Close,
    Reasonable,
}

/// Raw visitor signals copied into match details for post-hoc tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorAudit {
    pub ip: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub isp: Option<String>,
}

impl From<&VisitorRecord> for VisitorAudit {
    fn from(visitor: &VisitorRecord) -> Self {
        Self {
            ip: visitor.geo.ip.clone(),
            city: visitor.geo.city.clone(),
            country: visitor.country_signal().map(String::from),
            state: visitor.geo.region_name.clone(),
            zip: visitor.geo.postal_code.clone(),
            isp: visitor.geo.isp.clone(),
        }
    }
}

// ─── Analytics ──────────────────────────────────────────────────────────────

/// Pipeline event emitted through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    /// Transaction id for sale events, session id for visitor events.
    pub subject_id: String,
    pub session_id: Option<String>,
    pub confidence: Option<u8>,
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    VisitorRecorded,
    VisitorsEvicted,
    SaleReceived,
    SaleMalformed,
    MatchFound,
    NoMatch,
    ConversionSent,
    ConversionFailed,
}
