//! CSV bar files.
//!
//! Header: `timestamp,open,high,low,close,volume`. Timestamps are RFC 3339
//! strings or integer Unix milliseconds (the exchange kline convention).
//! Files hold one symbol; the `symbol` argument of [`BarSource::fetch_bars`]
//! is only used in error messages.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::interval::Interval;
use super::provider::{validate_order, BarSource, DataError};
use crate::domain::Bar;

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Parse an RFC 3339 timestamp or integer Unix milliseconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DataError> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| DataError::Validation(format!("timestamp out of range: {ms}")));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DataError::Validation(format!("bad timestamp '{raw}': {e}")))
}

/// Read every bar in a CSV file.
///
/// Rejects unordered or duplicate timestamps, and any non-void row whose
/// prices are not positive or whose high/low do not bound open and close.
/// Void rows (a NaN price) load as-is and are held over by the engine.
pub fn read_bars_csv(path: &Path) -> Result<Vec<Bar>, DataError> {
    let io_err = |e: &dyn std::fmt::Display| DataError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    let mut reader = csv::Reader::from_path(path).map_err(|e| io_err(&e))?;

    let mut bars = Vec::new();
    for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row.map_err(|e| DataError::Csv(format!("{}: row {}: {e}", path.display(), line + 1)))?;
        let bar = Bar {
            timestamp: parse_timestamp(&row.timestamp)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        };
        if !bar.is_void() && !bar.is_sane() {
            return Err(DataError::Validation(format!(
                "{}: row {}: bad OHLC at {} (o={} h={} l={} c={})",
                path.display(),
                line + 1,
                bar.timestamp,
                bar.open,
                bar.high,
                bar.low,
                bar.close
            )));
        }
        bars.push(bar);
    }
    validate_order(&bars)?;
    Ok(bars)
}

/// Write bars with RFC 3339 timestamps, readable by [`read_bars_csv`].
pub fn write_bars_csv(path: &Path, bars: &[Bar]) -> Result<(), DataError> {
    let io_err = |e: &dyn std::fmt::Display| DataError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    let mut writer = csv::Writer::from_path(path).map_err(|e| io_err(&e))?;
    writer
        .write_record(["timestamp", "open", "high", "low", "close", "volume"])
        .map_err(|e| DataError::Csv(e.to_string()))?;
    for bar in bars {
        writer
            .write_record([
                bar.timestamp.to_rfc3339(),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
            ])
            .map_err(|e| DataError::Csv(e.to_string()))?;
    }
    writer.flush().map_err(|e| io_err(&e))?;
    Ok(())
}

/// Bar source backed by a single CSV file.
#[derive(Debug, Clone)]
pub struct CsvBarSource {
    path: PathBuf,
}

impl CsvBarSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BarSource for CsvBarSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, DataError> {
        let bars: Vec<Bar> = read_bars_csv(&self.path)?
            .into_iter()
            .filter(|b| b.timestamp >= start && end.map_or(true, |e| b.timestamp < e))
            .collect();
        if bars.is_empty() {
            return Err(DataError::Empty {
                symbol: symbol.to_string(),
                interval,
            });
        }
        Ok(bars)
    }
}
