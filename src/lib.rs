//! COTAHIST quote cache: decode the exchange's fixed-width historical quote
//! files into SQLite and serve ticker lists, histories, chart series and
//! memoized summary metrics from it.

pub mod config;
pub mod engine;
pub mod market_data;
pub mod persist;
pub mod telemetry;
