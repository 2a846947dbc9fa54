#![warn(clippy::unwrap_used)]

//! Attribution orchestration for the two sale triggers: inbound webhooks
//! and the periodic sales-history poll.

pub mod poller;
pub mod processor;

pub use poller::{PollSummary, SalesPoller};
pub use processor::{DeliveryOutcome, MatchSummary, ProcessOutcome, SaleProcessor};
