//! Browser-originated events (PageView, InitiateCheckout) re-sent through
//! the server-side API with the same hashing gate as purchases.

use chrono::{DateTime, Utc};
use funnel_core::time::parse_timestamp;
use funnel_core::types::non_blank;
use funnel_core::{FunnelError, FunnelResult};
use serde::Deserialize;
use serde_json::Value;

use crate::payload::{ConversionEvent, CustomData, RawUserData, ACTION_SOURCE};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrontendEvent {
    pub event_type: Option<String>,
    pub event_id: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: Option<Value>,
    #[serde(rename = "unix_timestamp")]
    pub unix_timestamp: Option<i64>,
    pub custom_parameters: CustomParameters,
    pub formatted_data: Option<FormattedGeo>,
}

/// Parameters the browser attached to the pixel call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CustomParameters {
    pub client_ip_address: Option<String>,
    pub client_user_agent: Option<String>,
    pub fbp: Option<String>,
    pub fbc: Option<String>,
    pub content_name: Option<String>,
    pub content_category: Option<String>,
    pub content_type: Option<String>,
    pub currency: Option<String>,
    pub value: Option<f64>,
}

/// Geo fields already formatted by the browser for the ad platform.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormattedGeo {
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
}

/// Remove zero-width and other invisible format characters.
pub fn strip_invisible(value: &str) -> String {
    value
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{200B}'..='\u{200D}' | '\u{FEFF}' | '\u{180E}' | '\u{17B5}' | '\u{2060}' | '\u{061C}'
            )
        })
        .collect()
}

fn clean(value: Option<String>) -> Option<String> {
    non_blank(value.map(|v| strip_invisible(&v)))
}

impl FrontendEvent {
    pub fn from_json(raw: &Value) -> FunnelResult<Self> {
        serde_json::from_value(raw.clone())
            .map_err(|e| FunnelError::Validation(format!("invalid frontend event: {e}")))
    }

    /// Convert into a server-side event. `now` is used when the browser
    /// sent no usable timestamp.
    pub fn into_conversion(self, now: DateTime<Utc>) -> FunnelResult<ConversionEvent> {
        let event_name = non_blank(self.event_type)
            .ok_or_else(|| FunnelError::Validation("frontend event has no eventType".into()))?;

        let event_time = self
            .unix_timestamp
            .or_else(|| {
                self.timestamp
                    .as_ref()
                    .and_then(parse_timestamp)
                    .map(|t| t.timestamp())
            })
            .unwrap_or_else(|| now.timestamp());

        let params = self.custom_parameters;
        let geo = self.formatted_data.unwrap_or_default();
        let user_data = RawUserData {
            external_id: non_blank(self.session_id),
            client_ip_address: non_blank(params.client_ip_address),
            client_user_agent: non_blank(params.client_user_agent),
            fbp: non_blank(params.fbp),
            fbc: non_blank(params.fbc),
            country: geo.country,
            state: geo.state,
            city: geo.city,
            zip: geo.zip,
            ..Default::default()
        }
        .hash();

        Ok(ConversionEvent {
            event_name,
            event_time,
            event_id: non_blank(self.event_id),
            user_data,
            custom_data: CustomData {
                content_name: clean(params.content_name),
                content_category: clean(params.content_category),
                content_type: clean(params.content_type),
                currency: non_blank(params.currency),
                value: params.value,
                ..Default::default()
            },
            action_source: ACTION_SOURCE.to_string(),
        })
    }
}

/// Parse and convert a raw browser event.
pub fn frontend_to_conversion(raw: &Value, now: DateTime<Utc>) -> FunnelResult<ConversionEvent> {
    FrontendEvent::from_json(raw)?.into_conversion(now)
}
