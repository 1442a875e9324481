//! Pure conversions between the persisted row structs and SQLite rows.
//!
//! This file MUST NOT open connections or run statements of its own. It only
//! binds a struct into a prepared insert and reads one back from a row.

use itertools::Itertools;
use rusqlite::{params, Row, Statement};

use crate::persist::types::{Entity, MetricRow, QuoteRow};

/// A struct persisted as one row of a fixed `Entity`.
pub trait Record: Sized {
    const ENTITY: Entity;

    /// Execute the entity's prepared insert with this row's values, bound in
    /// `Entity::columns` order.
    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize>;

    /// Read a row selected with `Entity::columns` order.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

impl Record for QuoteRow {
    const ENTITY: Entity = Entity::Quotes;

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.trade_date,
            self.ticker,
            self.company_name,
            self.segment_code,
            self.open,
            self.high,
            self.low,
            self.avg_price,
            self.close,
            self.traded_quantity,
            self.financial_volume,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(QuoteRow {
            trade_date: row.get(0)?,
            ticker: row.get(1)?,
            company_name: row.get(2)?,
            segment_code: row.get(3)?,
            open: row.get(4)?,
            high: row.get(5)?,
            low: row.get(6)?,
            avg_price: row.get(7)?,
            close: row.get(8)?,
            traded_quantity: row.get(9)?,
            financial_volume: row.get(10)?,
        })
    }
}

impl Record for MetricRow {
    const ENTITY: Entity = Entity::Metrics;

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.ticker,
            self.mean_close,
            self.max_high,
            self.close_volatility,
            self.as_of,
            self.computed_at,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(MetricRow {
            ticker: row.get(0)?,
            mean_close: row.get(1)?,
            max_high: row.get(2)?,
            close_volatility: row.get(3)?,
            as_of: row.get(4)?,
            computed_at: row.get(5)?,
        })
    }
}

/// `INSERT INTO <table> (<columns>) VALUES (?1, ...)` for an entity.
pub(crate) fn insert_sql(entity: Entity) -> String {
    let columns = entity.columns();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        entity.table(),
        columns.join(", "),
        (1..=columns.len()).map(|i| format!("?{i}")).join(", ")
    )
}

/// `SELECT <columns> FROM <table>` for an entity, without a filter.
pub(crate) fn select_sql(entity: Entity) -> String {
    format!("SELECT {} FROM {}", entity.columns().join(", "), entity.table())
}
