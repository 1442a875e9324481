//! Fixed-width COTAHIST decoder.
//!
//! A file is one header line, any number of data records and one trailer
//! line. Header and trailer are skipped. A data record that fails to decode
//! is left out of the output and counted in the [`DecodeReport`]; it never
//! aborts the batch.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use crate::market_data::layout::{Field, RecordLayout};
use crate::market_data::normaliser::{column_text, Normaliser};
use crate::persist::QuoteRow;

/// Record type of a quote line. `00` is the header, `99` the trailer.
pub const DATA_RECORD_TYPE: &str = "01";

pub const DEFAULT_ERROR_SAMPLES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed date in `{field}`: {raw:?}")]
    MalformedDate { field: Field, raw: String },

    #[error("malformed number in `{field}`: {raw:?}")]
    MalformedNumeric { field: Field, raw: String },

    #[error("line is {len} bytes, layout needs {needed}")]
    ShortLine { len: usize, needed: usize },

    #[error("unexpected record type {0:?}")]
    UnexpectedRecordType(String),

    #[error("duplicate session {ticker} {trade_date}, first record kept")]
    DuplicateKey { ticker: String, trade_date: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// 1-based line number in the source file (the header is line 1).
    pub line: usize,
    pub error: DecodeError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub data_lines: usize,
    pub decoded: usize,
    pub skipped: usize,
    /// The first few failures, in file order.
    pub samples: Vec<RowError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub rows: Vec<QuoteRow>,
    pub report: DecodeReport,
}

pub struct Decoder {
    layout: RecordLayout,
    normaliser: Normaliser,
    max_samples: usize,
}

impl Decoder {
    pub fn new(layout: RecordLayout) -> Self {
        Self {
            layout,
            normaliser: Normaliser::default(),
            max_samples: DEFAULT_ERROR_SAMPLES,
        }
    }

    pub fn with_error_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    fn column<'a>(&self, line: &'a [u8], field: Field) -> std::borrow::Cow<'a, str> {
        column_text(&line[self.layout.span(field)])
    }

    /// Decode one data record (without its line terminator).
    pub fn decode_line(&self, line: &[u8]) -> Result<QuoteRow, DecodeError> {
        let needed = self.layout.min_line_len();
        if line.len() < needed {
            return Err(DecodeError::ShortLine { len: line.len(), needed });
        }

        let record_type = self.column(line, Field::RecordType);
        if record_type != DATA_RECORD_TYPE {
            return Err(DecodeError::UnexpectedRecordType(record_type.into_owned()));
        }

        let n = &self.normaliser;
        Ok(QuoteRow {
            trade_date: n.date(Field::TradeDate, &self.column(line, Field::TradeDate))?,
            ticker: n.text(&self.column(line, Field::Ticker)),
            company_name: n.text(&self.column(line, Field::CompanyName)),
            segment_code: n.text(&self.column(line, Field::SegmentCode)),
            open: n.price(Field::Open, &self.column(line, Field::Open))?,
            high: n.price(Field::High, &self.column(line, Field::High))?,
            low: n.price(Field::Low, &self.column(line, Field::Low))?,
            avg_price: n.price(Field::Average, &self.column(line, Field::Average))?,
            close: n.price(Field::Close, &self.column(line, Field::Close))?,
            traded_quantity: n.quantity(Field::TradedQuantity, &self.column(line, Field::TradedQuantity))?,
            financial_volume: n.volume(Field::FinancialVolume, &self.column(line, Field::FinancialVolume))?,
        })
    }

    /// Decode every record between the first (header) and last (trailer) line.
    pub fn decode_reader<R: BufRead>(&self, reader: R) -> io::Result<Decoded> {
        let mut rows = Vec::new();
        let mut report = DecodeReport::default();

        let mut lines = reader.split(b'\n');
        if lines.next().transpose()?.is_none() {
            return Ok(Decoded { rows, report });
        }

        // Hold each non-blank line back by one so the trailer is never decoded.
        let mut line_no = 1;
        let mut pending: Option<(usize, Vec<u8>)> = None;
        let mut seen = HashSet::new();
        for line in lines {
            let line = line?;
            line_no += 1;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            if let Some((prev_no, prev)) = pending.replace((line_no, line)) {
                self.push_record(&prev, prev_no, &mut seen, &mut rows, &mut report);
            }
        }

        if report.skipped > 0 {
            warn!(
                skipped = report.skipped,
                decoded = report.decoded,
                first = ?report.samples.first(),
                "some records could not be decoded"
            );
        }
        metrics::counter!("cotahist_rows_decoded_total").increment(report.decoded as u64);
        metrics::counter!("cotahist_rows_skipped_total").increment(report.skipped as u64);

        Ok(Decoded { rows, report })
    }

    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn decode_path(&self, path: impl AsRef<Path>) -> io::Result<Decoded> {
        let file = File::open(path.as_ref())?;
        let decoded = self.decode_reader(BufReader::new(file))?;
        info!(
            data_lines = decoded.report.data_lines,
            decoded = decoded.report.decoded,
            skipped = decoded.report.skipped,
            "file decoded"
        );
        Ok(decoded)
    }

    fn push_record(
        &self,
        raw: &[u8],
        line: usize,
        seen: &mut HashSet<(String, NaiveDate)>,
        rows: &mut Vec<QuoteRow>,
        report: &mut DecodeReport,
    ) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        report.data_lines += 1;
        let decoded = self.decode_line(raw).and_then(|row| {
            // (ticker, trade_date) is the quote table's primary key.
            if seen.insert((row.ticker.clone(), row.trade_date)) {
                Ok(row)
            } else {
                Err(DecodeError::DuplicateKey {
                    ticker: row.ticker,
                    trade_date: row.trade_date,
                })
            }
        });
        match decoded {
            Ok(row) => {
                report.decoded += 1;
                rows.push(row);
            }
            Err(error) => {
                debug!(line, error = %error, "skipping record");
                report.skipped += 1;
                if report.samples.len() < self.max_samples {
                    report.samples.push(RowError { line, error });
                }
            }
        }
    }
}
