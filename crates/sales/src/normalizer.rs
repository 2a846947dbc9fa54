//! Sale normalizer: maps both payment-platform shapes onto `SaleRecord`.
//!
//! An unparsable purchase date does not fail normalization: the record keeps
//! the raw value with `purchase_time = None`, and the matcher turns that into
//! a zero-confidence `error-invalid-dates` result so batch processing goes on.

use funnel_core::time::parse_timestamp;
use funnel_core::types::{Buyer, BuyerAddress, Price, Product, SaleRecord, SaleStatus};
use funnel_core::{FunnelError, FunnelResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::shapes::{
    value_to_string, PollingSale, RawBuyer, RawPrice, RawProduct, WebhookEnvelope,
};

/// Currency assumed when the platform omits it.
pub const DEFAULT_CURRENCY: &str = "BRL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleShape {
    /// Sales-history API item; price in minor units.
    Polling,
    /// Push notification; price in major units.
    Webhook,
}

/// Result of normalizing a polling response page.
#[derive(Debug, Clone, Default)]
pub struct SalesPage {
    pub sales: Vec<SaleRecord>,
    pub malformed: usize,
}

pub fn normalize_sale(raw: &Value, shape: SaleShape) -> FunnelResult<SaleRecord> {
    let result = match shape {
        SaleShape::Polling => normalize_polling(raw),
        SaleShape::Webhook => normalize_webhook(raw),
    };
    match &result {
        Ok(sale) => {
            metrics::counter!("sales.normalized").increment(1);
            debug!(
                transaction_id = %sale.transaction_id,
                shape = ?shape,
                status = ?sale.status,
                valid_time = sale.purchase_time.is_some(),
                "Sale normalized"
            );
        }
        Err(e) => {
            metrics::counter!("sales.malformed").increment(1);
            warn!(error = %e, shape = ?shape, "Sale payload rejected");
        }
    }
    result
}

/// Normalize every `items[]` entry; malformed items are counted and skipped.
pub fn normalize_sales_page(raw: &Value) -> SalesPage {
    let mut page = SalesPage::default();
    let Some(items) = raw.get("items").and_then(Value::as_array) else {
        return page;
    };
    for item in items {
        match normalize_sale(item, SaleShape::Polling) {
            Ok(sale) => page.sales.push(sale),
            Err(_) => page.malformed += 1,
        }
    }
    page
}

fn normalize_polling(raw: &Value) -> FunnelResult<SaleRecord> {
    let sale: PollingSale = serde_json::from_value(raw.clone())
        .map_err(|e| FunnelError::MalformedSale(format!("unreadable sale item: {e}")))?;

    let purchase = sale.purchase.unwrap_or_default();
    let transaction_id = sale
        .transaction
        .or(purchase.transaction)
        .ok_or_else(|| FunnelError::MalformedSale("sale item has no transaction id".into()))?;

    let raw_date = sale.purchase_date.or(purchase.order_date);
    let status = match sale.status {
        Some(Value::Object(status)) => status
            .get("transaction_status")
            .and_then(value_to_string)
            .map(|s| SaleStatus::from_platform(&s)),
        Some(other) => value_to_string(&other).map(|s| SaleStatus::from_platform(&s)),
        None => None,
    }
    .unwrap_or_else(|| SaleStatus::Other("UNKNOWN".into()));

    Ok(build_record(
        transaction_id,
        raw_date,
        status,
        sale.buyer,
        sale.product,
        sale.price.map(|p| to_price(p, 1.0)),
    ))
}

fn normalize_webhook(raw: &Value) -> FunnelResult<SaleRecord> {
    let envelope: WebhookEnvelope = serde_json::from_value(raw.clone())
        .map_err(|e| FunnelError::MalformedSale(format!("unreadable webhook: {e}")))?;

    let (event, data) = envelope.into_parts();
    let data = data
        .ok_or_else(|| FunnelError::MalformedSale("webhook payload has no sale data".into()))?;

    let purchase = data.purchase;
    let transaction_id = purchase
        .transaction
        .ok_or_else(|| FunnelError::MalformedSale("webhook purchase has no transaction".into()))?;

    // Push notifications only distinguish cancellations; a missing status
    // on a purchase notification means approved.
    let status = purchase
        .status
        .as_deref()
        .map(SaleStatus::from_platform)
        .unwrap_or(SaleStatus::Approved);

    debug!(event = event.as_deref().unwrap_or("-"), transaction_id = %transaction_id, "Webhook received");

    Ok(build_record(
        transaction_id,
        purchase.order_date,
        status,
        data.buyer,
        data.product,
        purchase.price.map(|p| to_price(p, 100.0)),
    ))
}

fn build_record(
    transaction_id: String,
    raw_date: Option<Value>,
    status: SaleStatus,
    buyer: RawBuyer,
    product: RawProduct,
    price: Option<Price>,
) -> SaleRecord {
    let purchase_time_raw = raw_date
        .as_ref()
        .and_then(value_to_string)
        .unwrap_or_default();
    let purchase_time = raw_date.as_ref().and_then(parse_timestamp);

    SaleRecord {
        transaction_id,
        purchase_time,
        purchase_time_raw,
        status,
        buyer: Buyer {
            name: buyer.name,
            email: buyer.email,
            phone: buyer.checkout_phone,
            address: BuyerAddress {
                city: buyer.address.city,
                state: buyer.address.state,
                country: buyer.address.country,
                zip: buyer.address.zip_code,
            },
        },
        product: Product {
            id: product.id,
            name: product.name,
        },
        price,
    }
}

/// `to_minor` is 1 for values already in cents, 100 for major units.
fn to_price(raw: RawPrice, to_minor: f64) -> Price {
    Price {
        amount_minor: raw
            .value
            .map(|v| (v * to_minor).round() as i64)
            .unwrap_or(0),
        currency: raw
            .currency_value
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
    }
}
