pub mod types;
pub use types::*;
pub mod record;
pub use record::Record;
pub mod sqlite;

/// Table-backed persistence for decoded quotes and derived metrics.
///
/// Implementations own their connection handling; callers hold a handle and
/// never see SQL. Reads distinguish "no rows" (`Ok(vec![])`) from a failing
/// store (`Err`).
pub trait CacheStore: Send + Sync {
    /// Write `rows` to `R::ENTITY`, returning the number of rows written.
    fn upsert_table<R: Record>(&self, rows: &[R], mode: WriteMode) -> StoreResult<usize>;

    fn query<R: Record>(&self, filter: &Filter) -> StoreResult<Vec<R>>;

    /// Distinct text values of one column, honoring the filter's predicates,
    /// ordering and limit.
    fn distinct(&self, entity: Entity, column: &'static str, filter: &Filter) -> StoreResult<Vec<String>>;

    /// `MAX(column)` over the filtered rows, read back as text.
    fn max_text(&self, entity: Entity, column: &'static str, filter: &Filter) -> StoreResult<Option<String>>;

    /// Delete the filtered rows; an empty filter clears the table.
    fn delete(&self, entity: Entity, filter: &Filter) -> StoreResult<usize>;
}
