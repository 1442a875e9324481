use std::collections::HashMap;
use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::engine::{MarketFilter, DEFAULT_MIN_VOLUME, STANDARD_LOT_SEGMENT};
use crate::market_data::decoder::DEFAULT_ERROR_SAMPLES;

pub const DEFAULT_DB_URL: &str = "sqlite:///database/b3_cotacoes.db";
pub const DEFAULT_TICKER_LIMIT: u32 = 500;

/// Process settings. Key names match the environment variables they are read
/// from (`DB_CONNECTION_STRING`, `MIN_VOLUME_FILTER`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_connection_string: String,
    pub min_volume_filter: f64,
    /// Comma-separated segment (BDI) codes, e.g. `02,03`.
    pub allowed_bdi_codes: String,
    pub b3_file_path: Option<PathBuf>,
    pub ticker_limit: u32,
    pub decode_error_samples: usize,
}

impl Settings {
    /// Defaults, then `cotahist.toml` if present, then the process
    /// environment (after loading `.env`).
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env(Environment::default())
    }

    /// Same layering with an explicit variable map instead of the process
    /// environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_env(Environment::default().source(Some(vars)))
    }

    fn from_env(env: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("db_connection_string", DEFAULT_DB_URL)?
            .set_default("min_volume_filter", DEFAULT_MIN_VOLUME)?
            .set_default("allowed_bdi_codes", STANDARD_LOT_SEGMENT)?
            .set_default("ticker_limit", i64::from(DEFAULT_TICKER_LIMIT))?
            .set_default("decode_error_samples", DEFAULT_ERROR_SAMPLES as i64)?
            .add_source(File::with_name("cotahist").required(false))
            .add_source(env)
            .build()?
            .try_deserialize()
    }

    /// Filesystem path of the SQLite database. Accepts either a bare path or a
    /// `sqlite:///path` URL.
    pub fn database_path(&self) -> PathBuf {
        let raw = self.db_connection_string.trim();
        let path = raw
            .strip_prefix("sqlite:///")
            .or_else(|| raw.strip_prefix("sqlite://"))
            .or_else(|| raw.strip_prefix("sqlite:"))
            .unwrap_or(raw);
        PathBuf::from(path)
    }

    pub fn segment_codes(&self) -> Vec<String> {
        self.allowed_bdi_codes
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn market_filter(&self) -> MarketFilter {
        MarketFilter {
            min_volume: self.min_volume_filter,
            allowed_segment_codes: self.segment_codes(),
        }
    }

    /// Create the directory that will hold the SQLite file.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        match self.database_path().parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
            _ => Ok(()),
        }
    }
}
