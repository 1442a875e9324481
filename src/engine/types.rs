use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use crate::persist::{QuoteRow, StoreError};

/// Segment (BDI) code of the standard round-lot market.
pub const STANDARD_LOT_SEGMENT: &str = "02";

/// Liquidity floor used when none is configured: 100 million in traded value.
pub const DEFAULT_MIN_VOLUME: f64 = 100_000_000.0;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("ticker `{0}` not found or below the liquidity filter")]
    NotFound(String),

    #[error("chart type `{0}` is invalid, use one of: fechamento, abertura, volume")]
    InvalidChartKind(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a boundary layer should surface a `ServiceError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Internal,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::InvalidChartKind(_) => ErrorKind::BadRequest,
            ServiceError::Store(_) => ErrorKind::Internal,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Which instruments count as "available".
#[derive(Debug, Clone, PartialEq)]
pub struct MarketFilter {
    pub min_volume: f64,
    pub allowed_segment_codes: Vec<String>,
}

impl Default for MarketFilter {
    fn default() -> Self {
        Self {
            min_volume: DEFAULT_MIN_VOLUME,
            allowed_segment_codes: vec![STANDARD_LOT_SEGMENT.to_string()],
        }
    }
}

/// Tickers are stored upper-case; lookups are case-insensitive.
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    ClosingPrice,
    OpeningPrice,
    TradedVolume,
}

impl ChartKind {
    pub fn label(self) -> &'static str {
        match self {
            ChartKind::ClosingPrice => "Preço de Fechamento",
            ChartKind::OpeningPrice => "Preço de Abertura",
            ChartKind::TradedVolume => "Volume de Negociação",
        }
    }

    pub fn value(self, row: &QuoteRow) -> f64 {
        match self {
            ChartKind::ClosingPrice => row.close,
            ChartKind::OpeningPrice => row.open,
            ChartKind::TradedVolume => row.financial_volume,
        }
    }
}

impl FromStr for ChartKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fechamento" | "close" => Ok(ChartKind::ClosingPrice),
            "abertura" | "open" => Ok(ChartKind::OpeningPrice),
            "volume" => Ok(ChartKind::TradedVolume),
            _ => Err(ServiceError::InvalidChartKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub trade_date: NaiveDate,
    pub value: f64,
}

/// What a chart renderer needs to draw one ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub ticker: String,
    pub kind: ChartKind,
    pub label: &'static str,
    pub points: Vec<ChartPoint>,
}
