#![warn(clippy::unwrap_used)]

//! Server-side conversion reporting: payload building behind a hashing
//! gate, delivery to the ad platform, and the delivery log.

pub mod client;
pub mod delivery_log;
pub mod frontend;
pub mod hashing;
pub mod payload;

pub use client::{CapiClient, ConversionSink, DeliveryReceipt};
pub use delivery_log::{DeliveryLog, DeliveryLogEntry, DeliveryStats, DeliveryStatus};
pub use frontend::{frontend_to_conversion, FrontendEvent};
pub use hashing::HashedValue;
pub use payload::{build_conversion_payload, ConversionEnvelope, ConversionEvent};
