//! # Import a year of quotes
//! cotahist import --file data/COTAHIST_A2025.TXT
//!
//! # Query the cache
//! cotahist tickers --limit 50
//! cotahist history PETR4 --format csv
//! cotahist metrics PETR4
//! cotahist chart PETR4 --kind volume

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use cotahist_cache::config::Settings;
use cotahist_cache::engine::chart::ChartService;
use cotahist_cache::engine::market::MarketService;
use cotahist_cache::engine::metrics::MetricsService;
use cotahist_cache::engine::ServiceError;
use cotahist_cache::market_data::decoder::{DecodeReport, Decoder};
use cotahist_cache::market_data::layout::{LayoutVersion, RecordLayout};
use cotahist_cache::market_data::pipeline::ingest_file;
use cotahist_cache::persist::sqlite::SqliteCacheStore;
use cotahist_cache::telemetry;

#[derive(Parser)]
#[command(name = "cotahist")]
#[command(about = "Import exchange COTAHIST quote files and query the quote cache")]
#[command(version)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log: String,

    /// Port for the Prometheus exporter (with the `metrics-exporter` feature)
    #[arg(long, default_value_t = 9000)]
    metrics_port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a COTAHIST file and replace the cached quote history
    Import {
        /// Input file; defaults to B3_FILE_PATH
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List liquid tickers in the allowed segments
    Tickers {
        /// Maximum number of tickers; defaults to TICKER_LIMIT
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Print a ticker's history, oldest session first
    History {
        ticker: String,

        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },

    /// Print cached (or freshly computed) summary metrics for a ticker
    Metrics { ticker: String },

    /// Print the date/value series for a chart
    Chart {
        ticker: String,

        /// fechamento, abertura or volume
        #[arg(short, long, default_value = "fechamento")]
        kind: String,
    },

    /// Drop cached metrics for one ticker, or for all tickers
    InvalidateMetrics { ticker: Option<String> },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
}

#[derive(Serialize)]
struct TickerList {
    total: usize,
    tickers: Vec<String>,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn print_report(report: &DecodeReport, written: usize, invalidated: usize) {
    println!("\n=== Import Summary ===");
    println!("Data lines: {}", report.data_lines);
    println!("Decoded: {}, Skipped: {}", report.decoded, report.skipped);
    for sample in &report.samples {
        println!("  line {}: {}", sample.line, sample.error);
    }
    println!("Rows written: {}", written);
    println!("Cached metrics dropped: {}", invalidated);
    println!("======================\n");
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log);
    telemetry::init_metrics(cli.metrics_port)?;

    let settings = Settings::load().context("loading configuration")?;
    settings
        .ensure_directories()
        .context("creating database directory")?;

    let store = Arc::new(
        SqliteCacheStore::open(settings.database_path()).context("opening cache store")?,
    );
    let market = MarketService::new(Arc::clone(&store), settings.market_filter());

    match cli.command {
        Commands::Import { file } => {
            let layout = RecordLayout::for_version(LayoutVersion::CotahistV1)
                .context("COTAHIST layout is inconsistent")?;
            let decoder = Decoder::new(layout).with_error_samples(settings.decode_error_samples);
            let path = file
                .or_else(|| settings.b3_file_path.clone())
                .context("no input file: pass --file or set B3_FILE_PATH")?;

            let summary = ingest_file(store.as_ref(), &decoder, &path)?;
            print_report(&summary.report, summary.written, summary.metrics_invalidated);
        }
        Commands::Tickers { limit } => {
            let tickers = market.available_tickers(limit.unwrap_or(settings.ticker_limit))?;
            print_json(&TickerList {
                total: tickers.len(),
                tickers,
            })?;
        }
        Commands::History { ticker, format } => {
            let history = market.require_history(&ticker)?;
            match format {
                Format::Json => print_json(&history)?,
                Format::Csv => {
                    let mut writer = csv::Writer::from_writer(io::stdout().lock());
                    for row in &history {
                        writer.serialize(row)?;
                    }
                    writer.flush()?;
                }
            }
        }
        Commands::Metrics { ticker } => {
            let metrics = MetricsService::new(market);
            match metrics.get_metrics(&ticker)? {
                Some(metric) => print_json(&metric)?,
                None => return Err(ServiceError::NotFound(ticker.to_uppercase()).into()),
            }
        }
        Commands::Chart { ticker, kind } => {
            let charts = ChartService::new(market);
            print_json(&charts.series(&ticker, &kind)?)?;
        }
        Commands::InvalidateMetrics { ticker } => {
            let metrics = MetricsService::new(market);
            let dropped = metrics.invalidate(ticker.as_deref())?;
            println!("Dropped {} cached metric row(s)", dropped);
        }
    }

    Ok(())
}
