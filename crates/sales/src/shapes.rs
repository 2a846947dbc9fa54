//! Raw payment-platform payload shapes.
//!
//! Fields are deliberately lenient: ids and zip codes arrive as numbers or
//! strings, and any group may be missing.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One item of the sales-history polling response (`items[]`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PollingSale {
    #[serde(deserialize_with = "lenient_string")]
    pub transaction: Option<String>,
    pub purchase_date: Option<Value>,
    pub purchase: Option<PollingPurchase>,
    pub status: Option<Value>,
    pub buyer: RawBuyer,
    pub price: Option<RawPrice>,
    pub product: RawProduct,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PollingPurchase {
    #[serde(deserialize_with = "lenient_string")]
    pub transaction: Option<String>,
    pub order_date: Option<Value>,
}

/// Push notification; relays may wrap it in a `body` envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookEnvelope {
    pub body: Option<WebhookBody>,
    pub event: Option<String>,
    pub data: Option<WebhookData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookBody {
    pub event: Option<String>,
    pub data: Option<WebhookData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookData {
    pub purchase: WebhookPurchase,
    pub buyer: RawBuyer,
    pub product: RawProduct,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookPurchase {
    #[serde(deserialize_with = "lenient_string")]
    pub transaction: Option<String>,
    pub order_date: Option<Value>,
    #[serde(deserialize_with = "lenient_string")]
    pub status: Option<String>,
    pub price: Option<RawPrice>,
}

impl WebhookEnvelope {
    /// Unwrap the optional relay envelope.
    pub fn into_parts(self) -> (Option<String>, Option<WebhookData>) {
        match self.body {
            Some(body) if body.data.is_some() => (body.event, body.data),
            _ => (self.event, self.data),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawBuyer {
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(alias = "phone", deserialize_with = "lenient_string")]
    pub checkout_phone: Option<String>,
    pub address: RawAddress,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAddress {
    #[serde(deserialize_with = "lenient_string")]
    pub city: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub country: Option<String>,
    #[serde(alias = "zipcode", deserialize_with = "lenient_string")]
    pub zip_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPrice {
    pub value: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub currency_value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawProduct {
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
}

/// Render a scalar JSON value as a trimmed, non-empty string.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_string))
}
