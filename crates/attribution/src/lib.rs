#![warn(clippy::unwrap_used)]

//! Visitor-to-sale attribution: pairwise scoring, best-match selection over
//! the visitor pool, and the match log behind the stats endpoint.

pub mod engine;
pub mod geo;
pub mod match_log;
pub mod scoring;
pub mod selection;

pub use engine::{Attribution, AttributionEngine, AttributionStats, CountWindow};
pub use match_log::{MatchLog, MatchRecord};
pub use scoring::{match_sale_with_visitor, ScoringWeights, INVALID_DATES_METHOD, MATCH_METHOD};
pub use selection::{find_best_match, is_valid_sale, is_valid_visitor, BestMatch};
