use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open cache store at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("write to {entity} failed: {source}")]
    Write {
        entity: Entity,
        #[source]
        source: rusqlite::Error,
    },

    #[error("read from {entity} failed: {source}")]
    Read {
        entity: Entity,
        #[source]
        source: rusqlite::Error,
    },

    #[error("refusing to write an empty batch to {0}")]
    EmptyBatch(Entity),

    #[error("column `{column}` is not part of {entity}")]
    UnknownColumn { entity: Entity, column: &'static str },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Tables owned by the cache store. Table and column names only ever come
/// from here; values supplied by callers are always bound as parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Quotes,
    Metrics,
}

impl Entity {
    pub const ALL: [Entity; 2] = [Entity::Quotes, Entity::Metrics];

    pub const fn table(self) -> &'static str {
        match self {
            Entity::Quotes => "quote_history",
            Entity::Metrics => "ticker_metrics",
        }
    }

    /// Column order here is the insert order used by `Record::insert`.
    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            Entity::Quotes => &[
                "trade_date",
                "ticker",
                "company_name",
                "segment_code",
                "open",
                "high",
                "low",
                "avg_price",
                "close",
                "traded_quantity",
                "financial_volume",
            ],
            Entity::Metrics => &[
                "ticker",
                "mean_close",
                "max_high",
                "close_volatility",
                "as_of",
                "computed_at",
            ],
        }
    }

    pub fn has_column(self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    pub(crate) const fn schema(self) -> &'static str {
        match self {
            Entity::Quotes => {
                "CREATE TABLE IF NOT EXISTS quote_history (
                    trade_date TEXT NOT NULL,
                    ticker TEXT NOT NULL,
                    company_name TEXT NOT NULL,
                    segment_code TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    avg_price REAL NOT NULL,
                    close REAL NOT NULL,
                    traded_quantity INTEGER NOT NULL,
                    financial_volume REAL NOT NULL,
                    PRIMARY KEY (ticker, trade_date)
                )"
            }
            Entity::Metrics => {
                "CREATE TABLE IF NOT EXISTS ticker_metrics (
                    ticker TEXT PRIMARY KEY,
                    mean_close REAL NOT NULL,
                    max_high REAL NOT NULL,
                    close_volatility REAL,
                    as_of TEXT NOT NULL,
                    computed_at TEXT NOT NULL
                )"
            }
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Drop the table's contents and insert the batch, atomically.
    Replace,
    /// Insert the batch next to existing rows. A key collision fails the batch.
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(&'static str, Value),
    Gte(&'static str, Value),
    Lt(&'static str, Value),
    In(&'static str, Vec<Value>),
}

impl Predicate {
    fn column(&self) -> &'static str {
        match self {
            Predicate::Eq(c, _) | Predicate::Gte(c, _) | Predicate::Lt(c, _) | Predicate::In(c, _) => c,
        }
    }
}

/// Filtered read description. Rendered to SQL only by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<(&'static str, Order)>,
    pub limit: Option<u32>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, column: &'static str, order: Order) -> Self {
        self.order_by.push((column, order));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Every column mentioned must belong to `entity`.
    pub fn validate(&self, entity: Entity) -> StoreResult<()> {
        let columns = self
            .predicates
            .iter()
            .map(Predicate::column)
            .chain(self.order_by.iter().map(|(c, _)| *c));
        for column in columns {
            if !entity.has_column(column) {
                return Err(StoreError::UnknownColumn { entity, column });
            }
        }
        Ok(())
    }

    /// Renders `WHERE ... ORDER BY ... LIMIT ?` with positional placeholders
    /// and returns the values to bind, in order.
    pub(crate) fn render(&self) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params: Vec<Value> = Vec::new();

        let clauses: Vec<String> = self
            .predicates
            .iter()
            .map(|p| match p {
                Predicate::Eq(c, v) => {
                    params.push(v.clone());
                    format!("{c} = ?")
                }
                Predicate::Gte(c, v) => {
                    params.push(v.clone());
                    format!("{c} >= ?")
                }
                Predicate::Lt(c, v) => {
                    params.push(v.clone());
                    format!("{c} < ?")
                }
                // An empty IN list matches nothing.
                Predicate::In(_, vs) if vs.is_empty() => "0".to_string(),
                Predicate::In(c, vs) => {
                    params.extend(vs.iter().cloned());
                    let marks = vec!["?"; vs.len()].join(", ");
                    format!("{c} IN ({marks})")
                }
            })
            .collect();

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order_by.is_empty() {
            let mut terms = self.order_by.iter().map(|(c, o)| match o {
                Order::Asc => format!("{c} ASC"),
                Order::Desc => format!("{c} DESC"),
            });
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(i64::from(limit)));
        }

        (sql, params)
    }
}

/// One trading session of one instrument, as decoded from a COTAHIST line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRow {
    pub trade_date: NaiveDate,
    pub ticker: String,
    pub company_name: String,
    pub segment_code: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub avg_price: f64,
    pub close: f64,
    pub traded_quantity: i64,
    pub financial_volume: f64,
}

/// Summary statistics for one ticker, memoized in `Entity::Metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub ticker: String,
    pub mean_close: f64,
    pub max_high: f64,
    /// Sample standard deviation of closes; `None` with fewer than two sessions.
    pub close_volatility: Option<f64>,
    /// Latest trade date the statistics cover.
    pub as_of: NaiveDate,
    pub computed_at: DateTime<Utc>,
}
