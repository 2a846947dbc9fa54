#![warn(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod event_bus;
pub mod repository;
pub mod time;
pub mod types;

pub use config::AppConfig;
pub use error::{FunnelError, FunnelResult};
pub use repository::VisitorRepository;
