// Batch ingestion: decode a COTAHIST file and swap it into the cache.
// Single writer only. Two concurrent imports race and the last replace wins.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::market_data::decoder::{DecodeReport, Decoder};
use crate::market_data::layout::LayoutError;
use crate::persist::{CacheStore, Entity, Filter, StoreError, WriteMode};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("no decodable records in {path} ({skipped} skipped)")]
    NothingDecoded { path: String, skipped: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub report: DecodeReport,
    pub written: usize,
    pub metrics_invalidated: usize,
}

/// Decode `path`, replace the quote table with its records and drop every
/// cached metric so the next request recomputes from the new history.
///
/// The metric wipe runs after the quote replace has committed. If it fails
/// the import still succeeds with `metrics_invalidated == 0`; cached rows
/// older than the new history are recomputed on their next read.
#[instrument(skip(store, decoder, path), fields(path = %path.as_ref().display()))]
pub fn ingest_file<S: CacheStore>(
    store: &S,
    decoder: &Decoder,
    path: impl AsRef<Path>,
) -> Result<IngestSummary, IngestError> {
    let path = path.as_ref();
    let decoded = decoder.decode_path(path).map_err(|source| IngestError::Io {
        path: path.display().to_string(),
        source,
    })?;

    if decoded.rows.is_empty() {
        return Err(IngestError::NothingDecoded {
            path: path.display().to_string(),
            skipped: decoded.report.skipped,
        });
    }

    let written = store.upsert_table(&decoded.rows, WriteMode::Replace)?;
    let metrics_invalidated = match store.delete(Entity::Metrics, &Filter::new()) {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "quotes replaced but cached metrics were not cleared");
            0
        }
    };
    info!(written, metrics_invalidated, "quote history replaced");

    Ok(IngestSummary {
        report: decoded.report,
        written,
        metrics_invalidated,
    })
}
