//! Inbound visitor telemetry as posted by the landing page.
//!
//! Every group and field is optional; only a session id is mandatory and a
//! timestamp must be derivable (explicit, geo-lookup unix time, or receipt
//! time).

use chrono::{DateTime, Utc};
use funnel_core::time::{from_epoch_secs, parse_timestamp};
use funnel_core::types::{
    non_blank, BrowserIds, MarketingAttribution, PageContext, VisitorGeo, VisitorRecord,
};
use funnel_core::{FunnelError, FunnelResult};
use serde::Deserialize;
use serde_json::Value;

/// Maximum accepted session id length.
const MAX_SESSION_ID_LEN: usize = 255;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackingPayload {
    pub external_id: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: Option<Value>,
    pub visitor_data: VisitorData,
    pub page_data: PageData,
    pub marketing_data: MarketingData,
    pub capi_data: BrowserData,
    pub facebook_pixel: BrowserData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VisitorData {
    pub ip: Option<String>,
    pub country: Option<String>,
    #[serde(alias = "countryCode")]
    pub country_code: Option<String>,
    pub state: Option<String>,
    pub region: Option<String>,
    #[serde(alias = "regionName")]
    pub region_name: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    #[serde(alias = "postalCode")]
    pub postal_code: Option<String>,
    pub latitude: Option<Value>,
    pub longitude: Option<Value>,
    pub timezone: Option<String>,
    pub currency: Option<String>,
    pub isp: Option<String>,
    pub unix_timestamp: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageData {
    pub url: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MarketingData {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub utm_term: Option<String>,
}

/// Browser identifiers; the landing page sends them in two groups.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrowserData {
    pub external_id: Option<String>,
    pub fbp: Option<String>,
    pub fbc: Option<String>,
}

impl TrackingPayload {
    pub fn from_json(raw: &Value) -> FunnelResult<Self> {
        serde_json::from_value(raw.clone())
            .map_err(|e| FunnelError::Validation(format!("unreadable tracking payload: {e}")))
    }

    /// Build the canonical visitor record.
    pub fn into_visitor(self, received_at: DateTime<Utc>) -> FunnelResult<VisitorRecord> {
        let session_id = self.session_id()?;
        let timestamp = self.observed_at(received_at)?;

        let v = self.visitor_data;
        let geo = VisitorGeo {
            ip: non_blank(v.ip),
            country: non_blank(v.country),
            country_code: non_blank(v.country_code),
            region_name: non_blank(v.state)
                .or_else(|| non_blank(v.region_name))
                .or_else(|| non_blank(v.region)),
            city: non_blank(v.city),
            postal_code: non_blank(v.zip).or_else(|| non_blank(v.postal_code)),
            latitude: v.latitude.as_ref().and_then(as_f64),
            longitude: v.longitude.as_ref().and_then(as_f64),
            timezone: non_blank(v.timezone),
            currency: non_blank(v.currency),
            isp: non_blank(v.isp),
        };

        let page = PageContext {
            url: non_blank(self.page_data.url),
            referrer: non_blank(self.page_data.referrer),
            user_agent: non_blank(self.page_data.user_agent),
        };

        let m = self.marketing_data;
        let marketing = MarketingAttribution {
            utm_source: non_blank(m.utm_source),
            utm_medium: non_blank(m.utm_medium),
            utm_campaign: non_blank(m.utm_campaign),
            utm_content: non_blank(m.utm_content),
            utm_term: non_blank(m.utm_term),
        };

        let browser_ids = BrowserIds {
            fbp: non_blank(self.facebook_pixel.fbp).or_else(|| non_blank(self.capi_data.fbp)),
            fbc: non_blank(self.facebook_pixel.fbc).or_else(|| non_blank(self.capi_data.fbc)),
        };

        Ok(VisitorRecord {
            session_id,
            timestamp,
            received_at,
            geo,
            page,
            marketing,
            browser_ids,
        })
    }

    fn session_id(&self) -> FunnelResult<String> {
        let id = non_blank(self.external_id.clone())
            .or_else(|| non_blank(self.session_id.clone()))
            .or_else(|| non_blank(self.capi_data.external_id.clone()))
            .or_else(|| non_blank(self.facebook_pixel.external_id.clone()))
            .ok_or_else(|| FunnelError::Validation("missing external_id/session_id".into()))?;

        if id.len() > MAX_SESSION_ID_LEN {
            return Err(FunnelError::Validation(
                "session id exceeds maximum length".into(),
            ));
        }
        Ok(id)
    }

    fn observed_at(&self, received_at: DateTime<Utc>) -> FunnelResult<DateTime<Utc>> {
        match &self.timestamp {
            Some(Value::Null) | None => {}
            Some(Value::String(s)) if s.trim().is_empty() => {}
            Some(raw) => {
                return parse_timestamp(raw).ok_or_else(|| {
                    FunnelError::Validation(format!("unparsable visitor timestamp: {raw}"))
                });
            }
        }
        Ok(self
            .visitor_data
            .unix_timestamp
            .as_ref()
            .and_then(as_f64)
            .and_then(|secs| from_epoch_secs(secs as i64))
            .unwrap_or(received_at))
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
