//! Conversion payload builder: renders a confirmed match into the ad
//! platform's server-side event schema.

use funnel_core::types::{SaleRecord, VisitorRecord};
use funnel_core::{FunnelError, FunnelResult};
use serde::Serialize;

use crate::hashing::{hash_normalized, hash_zip, HashedValue};

pub const PURCHASE_EVENT: &str = "Purchase";
pub const ACTION_SOURCE: &str = "website";
pub const DEFAULT_CURRENCY: &str = "BRL";

/// Identity signals before hashing. Never serialized.
#[derive(Debug, Clone, Default)]
pub struct RawUserData {
    pub external_id: Option<String>,
    pub client_ip_address: Option<String>,
    pub client_user_agent: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub fbp: Option<String>,
    pub fbc: Option<String>,
}

impl RawUserData {
    /// The only path from raw identity fields to transmittable user data.
    pub fn hash(self) -> UserData {
        UserData {
            external_id: self.external_id,
            client_ip_address: self.client_ip_address,
            client_user_agent: self.client_user_agent,
            em: self.email.as_deref().and_then(hash_normalized),
            ph: self.phone.as_deref().and_then(hash_normalized),
            country: self.country.as_deref().and_then(hash_normalized),
            st: self.state.as_deref().and_then(hash_normalized),
            ct: self.city.as_deref().and_then(hash_normalized),
            zp: self.zip.as_deref().and_then(hash_zip),
            fbp: self.fbp,
            fbc: self.fbc,
        }
    }
}

/// Outbound user data. Network and browser ids stay in clear text,
/// personal fields are `HashedValue`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub em: Option<HashedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ph: Option<HashedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<HashedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub st: Option<HashedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<HashedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zp: Option<HashedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub content_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionEvent {
    pub event_name: String,
    /// Unix seconds.
    pub event_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub user_data: UserData,
    pub custom_data: CustomData,
    pub action_source: String,
}

/// Request body for the events endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionEnvelope {
    pub data: Vec<ConversionEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_event_code: Option<String>,
}

impl ConversionEnvelope {
    pub fn single(event: ConversionEvent, test_event_code: Option<String>) -> Self {
        Self {
            data: vec![event],
            test_event_code,
        }
    }
}

/// Build the purchase event for a matched (sale, visitor) pair.
///
/// Device and network signals come from the visitor; person-level identity
/// from the sale. Location prefers the visitor's geo lookup and falls back
/// to the buyer address. `event_id` is the transaction id so the platform
/// can deduplicate against the browser pixel.
pub fn build_conversion_payload(
    sale: &SaleRecord,
    visitor: &VisitorRecord,
) -> FunnelResult<ConversionEvent> {
    let purchase_time = sale.purchase_time.ok_or_else(|| {
        FunnelError::MalformedSale(format!(
            "cannot build conversion for {}: unparsable purchase time",
            sale.transaction_id
        ))
    })?;

    let address = &sale.buyer.address;
    let raw = RawUserData {
        external_id: Some(visitor.session_id.clone()),
        client_ip_address: visitor.geo.ip.clone(),
        client_user_agent: visitor.page.user_agent.clone(),
        email: sale.buyer.email.clone(),
        phone: sale.buyer.phone.clone(),
        country: visitor
            .geo
            .country_code
            .clone()
            .or_else(|| address.country.clone()),
        state: visitor
            .geo
            .region_name
            .clone()
            .or_else(|| address.state.clone()),
        city: visitor.geo.city.clone().or_else(|| address.city.clone()),
        zip: visitor
            .geo
            .postal_code
            .clone()
            .or_else(|| address.zip.clone()),
        fbp: visitor.browser_ids.fbp.clone(),
        fbc: visitor.browser_ids.fbc.clone(),
    };

    let custom_data = CustomData {
        currency: Some(
            sale.price
                .as_ref()
                .map(|p| p.currency.clone())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        ),
        value: sale.price.as_ref().map(|p| p.amount()),
        content_ids: sale.product.id.iter().cloned().collect(),
        content_name: sale.product.name.clone(),
        ..Default::default()
    };

    Ok(ConversionEvent {
        event_name: PURCHASE_EVENT.to_string(),
        event_time: purchase_time.timestamp(),
        event_id: Some(sale.transaction_id.clone()),
        user_data: raw.hash(),
        custom_data,
        action_source: ACTION_SOURCE.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use funnel_core::types::{
        BrowserIds, Buyer, BuyerAddress, PageContext, Price, Product, SaleStatus, VisitorGeo,
    };

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn sale() -> SaleRecord {
        SaleRecord {
            transaction_id: "HP777".into(),
            purchase_time: Some(at("2024-05-01T12:03:00.900Z")),
            purchase_time_raw: "1714564980900".into(),
            status: SaleStatus::Approved,
            buyer: Buyer {
                name: Some("Ana".into()),
                email: Some(" Ana@Example.com ".into()),
                phone: Some("+5581999990000".into()),
                address: BuyerAddress {
                    city: Some("Recife".into()),
                    state: Some("PE".into()),
                    country: Some("Brasil".into()),
                    zip: Some("50000-000".into()),
                },
            },
            product: Product {
                id: Some("42".into()),
                name: Some("Receitas".into()),
            },
            price: Some(Price {
                amount_minor: 9790,
                currency: "BRL".into(),
            }),
        }
    }

    fn visitor() -> VisitorRecord {
        let t = at("2024-05-01T12:00:00Z");
        VisitorRecord {
            session_id: "sess-1".into(),
            timestamp: t,
            received_at: t,
            geo: VisitorGeo {
                ip: Some("200.1.2.3".into()),
                country_code: Some("BR".into()),
                region_name: Some("Pernambuco".into()),
                city: Some("Recife".into()),
                ..Default::default()
            },
            page: PageContext {
                user_agent: Some("Mozilla/5.0".into()),
                ..Default::default()
            },
            marketing: Default::default(),
            browser_ids: BrowserIds {
                fbp: Some("fb.1.1714564800.123".into()),
                fbc: None,
            },
        }
    }

    #[test]
    fn test_purchase_event_fields() {
        let event = build_conversion_payload(&sale(), &visitor()).unwrap();
        assert_eq!(event.event_name, PURCHASE_EVENT);
        assert_eq!(event.event_time, 1_714_564_980);
        assert_eq!(event.event_id.as_deref(), Some("HP777"));
        assert_eq!(event.action_source, ACTION_SOURCE);
        assert_eq!(event.custom_data.value, Some(97.9));
        assert_eq!(event.custom_data.currency.as_deref(), Some("BRL"));
        assert_eq!(event.custom_data.content_ids, vec!["42".to_string()]);
    }

    #[test]
    fn test_identity_split_and_hashing() {
        let event = build_conversion_payload(&sale(), &visitor()).unwrap();
        let user = &event.user_data;

        // Clear-text network and browser signals from the visitor.
        assert_eq!(user.client_ip_address.as_deref(), Some("200.1.2.3"));
        assert_eq!(user.client_user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(user.external_id.as_deref(), Some("sess-1"));
        assert_eq!(user.fbp.as_deref(), Some("fb.1.1714564800.123"));

        // Hashed identity from the sale, location from the visitor.
        assert_eq!(user.em, hash_normalized("ana@example.com"));
        assert_eq!(user.ph, hash_normalized("+5581999990000"));
        assert_eq!(user.country, hash_normalized("br"));
        assert_eq!(user.st, hash_normalized("pernambuco"));
        assert_eq!(user.ct, hash_normalized("recife"));
        // Visitor has no postal code; the buyer's is used.
        assert_eq!(user.zp, hash_zip("50000000"));
    }

    #[test]
    fn test_serialized_payload_has_no_raw_pii() {
        let event = build_conversion_payload(&sale(), &visitor()).unwrap();
        let body = serde_json::to_string(&ConversionEnvelope::single(event, None)).unwrap();
        assert!(!body.to_lowercase().contains("ana@example.com"));
        assert!(!body.contains("5581999990000"));
        assert!(!body.contains("test_event_code"));
        assert!(body.contains("\"action_source\":\"website\""));
    }

    #[test]
    fn test_missing_price_and_product() {
        let mut s = sale();
        s.price = None;
        s.product = Product::default();
        let event = build_conversion_payload(&s, &visitor()).unwrap();
        assert_eq!(event.custom_data.value, None);
        assert_eq!(event.custom_data.currency.as_deref(), Some(DEFAULT_CURRENCY));
        assert!(event.custom_data.content_ids.is_empty());
    }

    #[test]
    fn test_unparsable_purchase_time_is_rejected() {
        let mut s = sale();
        s.purchase_time = None;
        let err = build_conversion_payload(&s, &visitor()).unwrap_err();
        assert!(matches!(err, FunnelError::MalformedSale(_)));
    }
}
