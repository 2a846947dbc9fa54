#![warn(clippy::unwrap_used)]

//! Visitor telemetry ingest, the in-memory visitor pool, and the retention
//! sweep that bounds it.

pub mod collector;
pub mod payload;
pub mod retention;
pub mod store;

pub use collector::VisitorCollector;
pub use payload::TrackingPayload;
pub use retention::RetentionPolicy;
pub use store::InMemoryVisitorStore;
