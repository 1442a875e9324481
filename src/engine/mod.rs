// Read-side services over the cache store
pub mod types;   // service errors, filters, chart kinds
pub mod market;  // available tickers + ticker history
pub mod metrics; // memoized summary statistics
pub mod chart;   // date/value series for the chart renderer

pub use types::*;
