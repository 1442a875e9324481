//! Per-ticker summary statistics, memoized in the cache store.
//!
//! A cached row is trusted while its `as_of` date is at least the latest
//! stored session for the ticker. Ingestion clears the whole metric table, and
//! a row that falls behind newer quotes is recomputed on the next request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use tracing::{debug, info, instrument, warn};

use crate::engine::market::MarketService;
use crate::engine::types::{normalize_ticker, ServiceResult};
use crate::persist::{CacheStore, Entity, Filter, MetricRow, Predicate, QuoteRow, StoreResult, WriteMode};

pub struct MetricsService<S> {
    store: Arc<S>,
    market: MarketService<S>,
}

impl<S: CacheStore> MetricsService<S> {
    pub fn new(market: MarketService<S>) -> Self {
        Self {
            store: Arc::clone(market.store()),
            market,
        }
    }

    /// Cached metrics for `ticker`, computing and caching them on a miss.
    /// `None` when the ticker has no history.
    #[instrument(skip(self))]
    pub fn get_metrics(&self, ticker: &str) -> ServiceResult<Option<MetricRow>> {
        let ticker = normalize_ticker(ticker);
        let by_ticker = Filter::new().with(Predicate::Eq("ticker", Value::Text(ticker.clone())));

        let cached: Option<MetricRow> = self.store.query(&by_ticker)?.into_iter().next();
        if let Some(metric) = cached {
            let latest = self.market.latest_trade_date(&ticker)?;
            if latest.map_or(true, |date| metric.as_of >= date) {
                ::metrics::counter!("cotahist_metric_cache_hits_total").increment(1);
                debug!(as_of = %metric.as_of, "metric cache hit");
                return Ok(Some(metric));
            }
            info!(as_of = %metric.as_of, latest = ?latest, "cached metric is stale");
            self.store.delete(Entity::Metrics, &by_ticker)?;
        }
        ::metrics::counter!("cotahist_metric_cache_misses_total").increment(1);

        let history = self.market.get_history(&ticker)?;
        let Some(metric) = compute_metrics(&ticker, &history, Utc::now()) else {
            return Ok(None);
        };

        // A failed write only costs a recompute next time.
        if let Err(e) = self.store.upsert_table(std::slice::from_ref(&metric), WriteMode::Append) {
            warn!(error = %e, "could not cache computed metric");
        }
        Ok(Some(metric))
    }

    /// Drop cached metrics for one ticker, or all of them.
    pub fn invalidate(&self, ticker: Option<&str>) -> ServiceResult<usize> {
        Ok(invalidate_metrics(self.store.as_ref(), ticker)?)
    }
}

pub fn invalidate_metrics<S: CacheStore>(store: &S, ticker: Option<&str>) -> StoreResult<usize> {
    let filter = match ticker {
        Some(t) => Filter::new().with(Predicate::Eq("ticker", Value::Text(normalize_ticker(t)))),
        None => Filter::new(),
    };
    store.delete(Entity::Metrics, &filter)
}

/// Mean close, max high and the sample (n - 1) standard deviation of closes.
pub fn compute_metrics(ticker: &str, history: &[QuoteRow], computed_at: DateTime<Utc>) -> Option<MetricRow> {
    let as_of = history.iter().map(|r| r.trade_date).max()?;
    let n = history.len() as f64;

    let mean_close = history.iter().map(|r| r.close).sum::<f64>() / n;
    let max_high = history.iter().map(|r| r.high).fold(f64::NEG_INFINITY, f64::max);
    let close_volatility = (history.len() >= 2).then(|| {
        let sum_sq: f64 = history.iter().map(|r| (r.close - mean_close).powi(2)).sum();
        (sum_sq / (n - 1.0)).sqrt()
    });

    Some(MetricRow {
        ticker: normalize_ticker(ticker),
        mean_close,
        max_high,
        close_volatility,
        as_of,
        computed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::MarketFilter;
    use crate::persist::sqlite::SqliteCacheStore;
    use chrono::{NaiveDate, TimeZone};

    fn quote(ticker: &str, day: u32, close: f64, high: f64) -> QuoteRow {
        QuoteRow {
            trade_date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            ticker: ticker.to_string(),
            company_name: "COMPANHIA".to_string(),
            segment_code: "02".to_string(),
            open: close,
            high,
            low: close - 1.0,
            avg_price: close,
            close,
            traded_quantity: 100,
            financial_volume: 2e9,
        }
    }

    fn services(rows: &[QuoteRow]) -> (Arc<SqliteCacheStore>, MetricsService<SqliteCacheStore>) {
        let store = Arc::new(SqliteCacheStore::open_in_memory().unwrap());
        if !rows.is_empty() {
            store.upsert_table(rows, WriteMode::Replace).unwrap();
        }
        let market = MarketService::new(Arc::clone(&store), MarketFilter::default());
        (store, MetricsService::new(market))
    }

    #[test]
    fn test_compute_metrics_two_closes() {
        let at = Utc.with_ymd_and_hms(2025, 1, 4, 0, 0, 0).unwrap();
        let history = vec![quote("PETR4", 2, 10.0, 10.8), quote("PETR4", 3, 11.0, 11.4)];
        let m = compute_metrics("petr4", &history, at).unwrap();

        assert_eq!(m.ticker, "PETR4");
        assert_eq!(m.mean_close, 10.5);
        assert_eq!(m.max_high, 11.4);
        let expected = std::f64::consts::FRAC_1_SQRT_2;
        assert!((m.close_volatility.unwrap() - expected).abs() < 1e-12);
        assert_eq!(m.as_of, NaiveDate::from_ymd_opt(2025, 1, 3).unwrap());
        assert_eq!(m.computed_at, at);
    }

    #[test]
    fn test_compute_metrics_single_and_empty() {
        let at = Utc::now();
        let single = compute_metrics("VALE3", &[quote("VALE3", 2, 61.0, 62.0)], at).unwrap();
        assert_eq!(single.mean_close, 61.0);
        assert_eq!(single.close_volatility, None);

        assert!(compute_metrics("VALE3", &[], at).is_none());
    }

    #[test]
    fn test_get_metrics_caches_on_first_request() {
        let (store, svc) = services(&[quote("PETR4", 2, 10.0, 10.8), quote("PETR4", 3, 11.0, 11.4)]);

        let first = svc.get_metrics("petr4").unwrap().unwrap();
        let cached: Vec<MetricRow> = store.query(&Filter::new()).unwrap();
        assert_eq!(cached, vec![first.clone()]);

        let second = svc.get_metrics("PETR4").unwrap().unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn test_get_metrics_unknown_ticker_caches_nothing() {
        let (store, svc) = services(&[]);
        assert_eq!(svc.get_metrics("UNKNOWN").unwrap(), None);
        assert!(store.query::<MetricRow>(&Filter::new()).unwrap().is_empty());
    }

    #[test]
    fn test_stale_metric_is_recomputed() {
        let (store, svc) = services(&[quote("PETR4", 2, 10.0, 10.8), quote("PETR4", 3, 11.0, 11.4)]);
        let first = svc.get_metrics("PETR4").unwrap().unwrap();

        // a newer session arrives without going through the ingestion pipeline
        store
            .upsert_table(&[quote("PETR4", 6, 12.0, 12.5)], WriteMode::Append)
            .unwrap();

        let refreshed = svc.get_metrics("PETR4").unwrap().unwrap();
        assert_ne!(refreshed.as_of, first.as_of);
        assert_eq!(refreshed.mean_close, 11.0);
        assert_eq!(refreshed.max_high, 12.5);
        assert_eq!(store.query::<MetricRow>(&Filter::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_invalidate_one_and_all() {
        let (store, svc) = services(&[quote("PETR4", 2, 10.0, 10.8), quote("VALE3", 2, 61.0, 62.0)]);
        svc.get_metrics("PETR4").unwrap();
        svc.get_metrics("VALE3").unwrap();

        assert_eq!(svc.invalidate(Some("petr4")).unwrap(), 1);
        let left: Vec<MetricRow> = store.query(&Filter::new()).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].ticker, "VALE3");

        assert_eq!(svc.invalidate(None).unwrap(), 1);
        assert!(store.query::<MetricRow>(&Filter::new()).unwrap().is_empty());
    }
}
