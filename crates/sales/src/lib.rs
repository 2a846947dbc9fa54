#![warn(clippy::unwrap_used)]

//! Payment-platform sale ingestion: normalizes polling and webhook payloads
//! into canonical `SaleRecord`s, and fetches recent sales for the poll job.

pub mod feed;
pub mod normalizer;
pub mod shapes;

pub use feed::{AccessTokenSource, HotmartSalesFeed, SalesFeed, SalesQuery, StaticAccessToken};
pub use normalizer::{normalize_sale, normalize_sales_page, SaleShape, SalesPage};
