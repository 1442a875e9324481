use tracing::instrument;

use crate::engine::market::MarketService;
use crate::engine::types::{normalize_ticker, ChartKind, ChartPoint, ChartSeries, ServiceResult};
use crate::persist::CacheStore;

/// Builds the series a chart renderer plots. Rendering itself happens elsewhere.
pub struct ChartService<S> {
    market: MarketService<S>,
}

impl<S: CacheStore> ChartService<S> {
    pub fn new(market: MarketService<S>) -> Self {
        Self { market }
    }

    /// The chart kind is checked before the lookup, so a bad kind is reported
    /// even for an unknown ticker.
    #[instrument(skip(self))]
    pub fn series(&self, ticker: &str, kind: &str) -> ServiceResult<ChartSeries> {
        let kind: ChartKind = kind.parse()?;
        let history = self.market.require_history(ticker)?;

        let points = history
            .iter()
            .map(|row| ChartPoint {
                trade_date: row.trade_date,
                value: kind.value(row),
            })
            .collect();

        Ok(ChartSeries {
            ticker: normalize_ticker(ticker),
            kind,
            label: kind.label(),
            points,
        })
    }
}
