use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::types::Value;
use tracing::{debug, instrument, warn};

use crate::engine::types::{normalize_ticker, MarketFilter, ServiceError, ServiceResult};
use crate::persist::{CacheStore, Entity, Filter, Order, Predicate, QuoteRow};

/// Read-side queries over the quote history.
pub struct MarketService<S> {
    store: Arc<S>,
    filter: MarketFilter,
}

impl<S> Clone for MarketService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            filter: self.filter.clone(),
        }
    }
}

fn ticker_eq(ticker: &str) -> Predicate {
    Predicate::Eq("ticker", Value::Text(normalize_ticker(ticker)))
}

impl<S: CacheStore> MarketService<S> {
    pub fn new(store: Arc<S>, filter: MarketFilter) -> Self {
        Self { store, filter }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn filter(&self) -> &MarketFilter {
        &self.filter
    }

    /// Distinct tickers with at least one session where the traded value is
    /// `>= min_volume` and the segment code is allowed, ordered by ticker.
    #[instrument(skip(self, allowed_segment_codes), fields(segments = allowed_segment_codes.len()))]
    pub fn list_tickers(
        &self,
        min_volume: f64,
        allowed_segment_codes: &[String],
        limit: u32,
    ) -> ServiceResult<Vec<String>> {
        let segments = allowed_segment_codes
            .iter()
            .map(|code| Value::Text(code.clone()))
            .collect();
        let filter = Filter::new()
            .with(Predicate::Gte("financial_volume", Value::Real(min_volume)))
            .with(Predicate::In("segment_code", segments))
            .order_by("ticker", Order::Asc)
            .limit(limit);

        let tickers = self.store.distinct(Entity::Quotes, "ticker", &filter)?;
        debug!(count = tickers.len(), "tickers listed");
        Ok(tickers)
    }

    /// `list_tickers` with the configured liquidity filter.
    pub fn available_tickers(&self, limit: u32) -> ServiceResult<Vec<String>> {
        self.list_tickers(self.filter.min_volume, &self.filter.allowed_segment_codes, limit)
    }

    /// Every stored session for `ticker`, oldest first. Unknown tickers give an
    /// empty history.
    #[instrument(skip(self))]
    pub fn get_history(&self, ticker: &str) -> ServiceResult<Vec<QuoteRow>> {
        let filter = Filter::new()
            .with(ticker_eq(ticker))
            .order_by("trade_date", Order::Asc);
        Ok(self.store.query(&filter)?)
    }

    /// Like `get_history`, but an empty history is `NotFound`.
    pub fn require_history(&self, ticker: &str) -> ServiceResult<Vec<QuoteRow>> {
        let history = self.get_history(ticker)?;
        if history.is_empty() {
            return Err(ServiceError::NotFound(normalize_ticker(ticker)));
        }
        Ok(history)
    }

    pub fn latest_trade_date(&self, ticker: &str) -> ServiceResult<Option<NaiveDate>> {
        let filter = Filter::new().with(ticker_eq(ticker));
        let latest = self.store.max_text(Entity::Quotes, "trade_date", &filter)?;
        Ok(latest.and_then(|raw| match raw.parse::<NaiveDate>() {
            Ok(date) => Some(date),
            Err(e) => {
                warn!(raw = %raw, error = %e, "unreadable trade_date in cache");
                None
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::ErrorKind;
    use crate::persist::sqlite::SqliteCacheStore;
    use crate::persist::WriteMode;

    fn quote(ticker: &str, date: (i32, u32, u32), close: f64, volume: f64, segment: &str) -> QuoteRow {
        QuoteRow {
            trade_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            ticker: ticker.to_string(),
            company_name: "COMPANHIA".to_string(),
            segment_code: segment.to_string(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            avg_price: close,
            close,
            traded_quantity: 100,
            financial_volume: volume,
        }
    }

    fn service(rows: &[QuoteRow]) -> MarketService<SqliteCacheStore> {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        if !rows.is_empty() {
            store.upsert_table(rows, WriteMode::Replace).unwrap();
        }
        MarketService::new(Arc::new(store), MarketFilter::default())
    }

    #[test]
    fn test_list_tickers_applies_volume_and_segment() {
        let svc = service(&[
            // liquid, standard lot
            quote("PETR4", (2025, 1, 2), 38.0, 2e9, "02"),
            // liquid only on one day
            quote("VALE3", (2025, 1, 2), 61.0, 5e7, "02"),
            quote("VALE3", (2025, 1, 3), 61.0, 3e8, "02"),
            // never liquid
            quote("MGLU3", (2025, 1, 2), 9.0, 9.9e7, "02"),
            // liquid but odd-lot segment
            quote("PETR4F", (2025, 1, 2), 38.0, 2e9, "96"),
            // liquid in the wrong segment, illiquid in the right one
            quote("BBAS3", (2025, 1, 2), 27.0, 5e8, "12"),
            quote("BBAS3", (2025, 1, 3), 27.0, 1e6, "02"),
        ]);

        let tickers = svc.list_tickers(100_000_000.0, &["02".to_string()], 500).unwrap();
        assert_eq!(tickers, vec!["PETR4".to_string(), "VALE3".to_string()]);
    }

    #[test]
    fn test_list_tickers_limit_and_segment_set() {
        let svc = service(&[
            quote("AAAA3", (2025, 1, 2), 1.0, 2e8, "02"),
            quote("BBBB11", (2025, 1, 2), 1.0, 2e8, "12"),
            quote("CCCC3", (2025, 1, 2), 1.0, 2e8, "02"),
        ]);
        let codes = vec!["02".to_string(), "12".to_string()];
        assert_eq!(svc.list_tickers(1e8, &codes, 2).unwrap(), vec!["AAAA3", "BBBB11"]);
        assert!(svc.list_tickers(1e8, &[], 10).unwrap().is_empty());
        assert_eq!(svc.available_tickers(10).unwrap(), vec!["AAAA3", "CCCC3"]);
    }

    #[test]
    fn test_history_is_ordered_and_case_insensitive() {
        let svc = service(&[
            quote("PETR4", (2025, 1, 6), 39.0, 2e9, "02"),
            quote("PETR4", (2025, 1, 2), 38.0, 2e9, "02"),
            quote("PETR4", (2025, 1, 3), 38.5, 2e9, "02"),
            quote("VALE3", (2025, 1, 2), 61.0, 2e9, "02"),
        ]);

        let history = svc.get_history("petr4").unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].trade_date <= w[1].trade_date));
        assert!(history.iter().all(|r| r.ticker == "PETR4"));
        assert_eq!(
            svc.latest_trade_date("Petr4").unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 6)
        );
    }

    #[test]
    fn test_unknown_ticker_is_empty_history() {
        let svc = service(&[]);
        assert!(svc.get_history("UNKNOWN").unwrap().is_empty());
        assert_eq!(svc.latest_trade_date("UNKNOWN").unwrap(), None);

        let err = svc.require_history("unknown").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "ticker `UNKNOWN` not found or below the liquidity filter");
    }
}
