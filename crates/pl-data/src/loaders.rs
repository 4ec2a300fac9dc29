//! CSV bar loading into the in-memory store.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use pl_types::{Bar, DataError, PlResult, Resolution, Symbol};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::memory::InMemoryMarketData;

#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(alias = "Date", alias = "date", alias = "Timestamp")]
    timestamp: String,
    #[serde(alias = "Open", alias = "open")]
    open: String,
    #[serde(alias = "High", alias = "high")]
    high: String,
    #[serde(alias = "Low", alias = "low")]
    low: String,
    #[serde(alias = "Close", alias = "close")]
    close: String,
    #[serde(alias = "Volume", alias = "volume")]
    volume: String,
}

/// Loads OHLCV bars from `{symbol}_{resolution}.csv`-style files.
#[derive(Debug, Clone)]
pub struct CsvBarLoader {
    pub data_directory: PathBuf,
    pub file_pattern: String,
    pub resolution: Resolution,
}

impl CsvBarLoader {
    pub fn new<P: AsRef<Path>>(data_directory: P) -> Self {
        Self {
            data_directory: data_directory.as_ref().to_path_buf(),
            file_pattern: "{symbol}_{resolution}.csv".to_string(),
            resolution: Resolution::Day,
        }
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.file_pattern = pattern.to_string();
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    fn file_path(&self, symbol: &Symbol) -> PathBuf {
        let filename = self
            .file_pattern
            .replace("{symbol}", &symbol.ticker)
            .replace("{resolution}", self.resolution.code())
            .replace("{exchange}", &symbol.exchange);

        self.data_directory.join(filename)
    }

    /// Read every bar for `symbol`, ordered by timestamp.
    pub fn load_symbol(&self, symbol: &Symbol) -> PlResult<Vec<Bar>> {
        let file_path = self.file_path(symbol);

        if !file_path.exists() {
            return Err(DataError::SourceNotFound(file_path.to_string_lossy().to_string()).into());
        }

        let file = std::fs::File::open(&file_path)?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

        let mut bars = Vec::new();
        for result in reader.deserialize() {
            let record: CsvRecord = result.map_err(|e| DataError::ParseError {
                message: format!("CSV parsing error: {}", e),
            })?;

            bars.push(Bar::new(
                symbol.clone(),
                parse_timestamp(&record.timestamp)?,
                parse_decimal("open", &record.open)?,
                parse_decimal("high", &record.high)?,
                parse_decimal("low", &record.low)?,
                parse_decimal("close", &record.close)?,
                parse_decimal("volume", &record.volume)?,
                self.resolution,
            ));
        }

        bars.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(bars)
    }

    /// Load several symbols in parallel into `store`.
    ///
    /// Symbols whose file is missing are skipped with a warning; parse and I/O
    /// failures abort the load. Returns the symbols that were loaded.
    pub fn load_into(&self, store: &InMemoryMarketData, symbols: &[Symbol]) -> PlResult<Vec<Symbol>> {
        let results: Vec<(Symbol, PlResult<Vec<Bar>>)> = symbols
            .par_iter()
            .map(|symbol| (symbol.clone(), self.load_symbol(symbol)))
            .collect();

        let mut loaded = Vec::with_capacity(results.len());
        for (symbol, result) in results {
            match result {
                Ok(bars) => {
                    info!("Loaded {} bars for {}", bars.len(), symbol);
                    store.insert_bars(symbol.clone(), bars);
                    loaded.push(symbol);
                }
                Err(pl_types::PlError::Data(DataError::SourceNotFound(path))) => {
                    warn!("No data file for {} at {}", symbol, path);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(loaded)
    }
}

fn parse_decimal(field: &str, raw: &str) -> PlResult<Decimal> {
    Decimal::from_str(raw.trim()).map_err(|e| {
        DataError::ParseError {
            message: format!("invalid {} value {:?}: {}", field, raw, e),
        }
        .into()
    })
}

fn parse_timestamp(raw: &str) -> PlResult<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc()))
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
        })
        .map_err(|e| {
            DataError::ParseError {
                message: format!("Date parsing error for {:?}: {}", raw, e),
            }
            .into()
        })
}
