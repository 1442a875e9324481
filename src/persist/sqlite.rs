use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, error, info, instrument, warn};

use crate::persist::record::{insert_sql, select_sql, Record};
use crate::persist::types::{Entity, Filter, StoreError, StoreResult, WriteMode};
use crate::persist::CacheStore;

/// SQLite-backed cache store. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct SqliteCacheStore {
    conn: Arc<Mutex<Connection>>,
    location: String,
}

impl SqliteCacheStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let location = path.as_ref().display().to_string();
        let conn = Connection::open(path.as_ref()).map_err(|source| StoreError::Open {
            path: location.clone(),
            source,
        })?;
        Self::init(conn, location)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let location = ":memory:".to_string();
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: location.clone(),
            source,
        })?;
        Self::init(conn, location)
    }

    fn init(conn: Connection, location: String) -> StoreResult<Self> {
        // In-memory databases answer `memory`; either way the store still works.
        match conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0)) {
            Ok(mode) => debug!(location = %location, journal_mode = %mode, "journal mode set"),
            Err(e) => warn!(location = %location, error = %e, "could not enable WAL journal"),
        }
        if let Err(e) = conn.pragma_update(None, "synchronous", "NORMAL") {
            warn!(location = %location, error = %e, "could not relax synchronous pragma");
        }

        for entity in Entity::ALL {
            conn.execute(entity.schema(), [])
                .map_err(|source| StoreError::Open {
                    path: location.clone(),
                    source,
                })?;
        }
        info!(location = %location, "cache store ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn read_failed(&self, entity: Entity, source: rusqlite::Error) -> StoreError {
        warn!(%entity, error = %source, "cache read failed");
        metrics::counter!("cotahist_store_errors_total", "op" => "read").increment(1);
        StoreError::Read { entity, source }
    }
}

fn write_batch<R: Record>(conn: &mut Connection, rows: &[R], mode: WriteMode) -> rusqlite::Result<usize> {
    let entity = R::ENTITY;
    let tx = conn.transaction()?;
    if mode == WriteMode::Replace {
        tx.execute(&format!("DELETE FROM {}", entity.table()), [])?;
    }
    let mut written = 0;
    {
        let mut stmt = tx.prepare(&insert_sql(entity))?;
        for row in rows {
            written += row.insert(&mut stmt)?;
        }
    }
    tx.commit()?;
    Ok(written)
}

fn read_rows<T, F>(conn: &Connection, sql: &str, params: &[Value], map: F) -> rusqlite::Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), map)?
        .collect::<Result<Vec<_>, _>>();
    rows
}

fn check_column(entity: Entity, column: &'static str) -> StoreResult<()> {
    if entity.has_column(column) {
        Ok(())
    } else {
        Err(StoreError::UnknownColumn { entity, column })
    }
}

impl CacheStore for SqliteCacheStore {
    #[instrument(skip(self, rows), fields(entity = %R::ENTITY, batch = rows.len()))]
    fn upsert_table<R: Record>(&self, rows: &[R], mode: WriteMode) -> StoreResult<usize> {
        let entity = R::ENTITY;
        if rows.is_empty() {
            warn!("empty batch, nothing written");
            return Err(StoreError::EmptyBatch(entity));
        }

        let mut conn = self.conn.lock();
        match write_batch(&mut conn, rows, mode) {
            Ok(written) => {
                info!(written, "cache table updated");
                Ok(written)
            }
            Err(source) => {
                error!(error = %source, "cache write failed, batch rolled back");
                metrics::counter!("cotahist_store_errors_total", "op" => "write").increment(1);
                Err(StoreError::Write { entity, source })
            }
        }
    }

    #[instrument(level = "debug", skip(self), fields(entity = %R::ENTITY))]
    fn query<R: Record>(&self, filter: &Filter) -> StoreResult<Vec<R>> {
        let entity = R::ENTITY;
        filter.validate(entity)?;
        let (clause, params) = filter.render();
        let sql = format!("{}{}", select_sql(entity), clause);

        let conn = self.conn.lock();
        let rows = read_rows(&conn, &sql, &params, R::from_row)
            .map_err(|source| self.read_failed(entity, source))?;
        debug!(rows = rows.len(), "query served");
        Ok(rows)
    }

    #[instrument(level = "debug", skip(self))]
    fn distinct(&self, entity: Entity, column: &'static str, filter: &Filter) -> StoreResult<Vec<String>> {
        check_column(entity, column)?;
        filter.validate(entity)?;
        let (clause, params) = filter.render();
        let sql = format!("SELECT DISTINCT {} FROM {}{}", column, entity.table(), clause);

        let conn = self.conn.lock();
        let values = read_rows(&conn, &sql, &params, |row| row.get::<_, String>(0))
            .map_err(|source| self.read_failed(entity, source))?;
        debug!(values = values.len(), "distinct values served");
        Ok(values)
    }

    #[instrument(level = "debug", skip(self))]
    fn max_text(&self, entity: Entity, column: &'static str, filter: &Filter) -> StoreResult<Option<String>> {
        check_column(entity, column)?;
        filter.validate(entity)?;
        let predicates_only = Filter {
            predicates: filter.predicates.clone(),
            ..Filter::default()
        };
        let (clause, params) = predicates_only.render();
        let sql = format!("SELECT MAX({}) FROM {}{}", column, entity.table(), clause);

        let conn = self.conn.lock();
        conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get::<_, Option<String>>(0))
            .optional()
            .map(Option::flatten)
            .map_err(|source| self.read_failed(entity, source))
    }

    #[instrument(skip(self))]
    fn delete(&self, entity: Entity, filter: &Filter) -> StoreResult<usize> {
        filter.validate(entity)?;
        let predicates_only = Filter {
            predicates: filter.predicates.clone(),
            ..Filter::default()
        };
        let (clause, params) = predicates_only.render();
        let sql = format!("DELETE FROM {}{}", entity.table(), clause);

        let conn = self.conn.lock();
        match conn.execute(&sql, params_from_iter(params.iter())) {
            Ok(deleted) => {
                info!(deleted, "cache rows deleted");
                Ok(deleted)
            }
            Err(source) => {
                error!(error = %source, "cache delete failed");
                metrics::counter!("cotahist_store_errors_total", "op" => "write").increment(1);
                Err(StoreError::Write { entity, source })
            }
        }
    }
}
