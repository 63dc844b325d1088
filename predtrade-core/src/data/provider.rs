//! Bar source trait and structured error types.
//!
//! The BarSource trait abstracts over where bars come from (exchange REST API,
//! CSV file, synthetic generator) so the engine can be driven by any of them and
//! tests never need the network.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::interval::Interval;
use crate::domain::Bar;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by exchange (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("no bars for {symbol} {interval} in the requested range")]
    Empty { symbol: String, interval: Interval },
}

/// Trait for bar sources.
pub trait BarSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch complete bars for `symbol` whose open time is in `[start, end)`.
    ///
    /// `end = None` means "up to now" (the rolling live window). Returned bars
    /// are strictly ordered by timestamp.
    fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, DataError>;
}

/// Fetch the most recent `count` complete bars ending at `now`.
///
/// Requests a slightly wider range than needed so a missing bar at the edge
/// does not starve the window, then keeps the last `count`.
pub fn fetch_recent(
    source: &dyn BarSource,
    symbol: &str,
    interval: Interval,
    count: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Bar>, DataError> {
    let start = i32::try_from(count.saturating_add(2))
        .ok()
        .and_then(|n| interval.duration().checked_mul(n))
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| {
            DataError::Validation(format!("window of {count} {interval} bars is out of range"))
        })?;
    let mut bars = source.fetch_bars(symbol, interval, start, Some(now))?;
    if bars.len() > count {
        bars.drain(..bars.len() - count);
    }
    Ok(bars)
}

/// Reject series whose timestamps are not strictly increasing.
pub fn validate_order(bars: &[Bar]) -> Result<(), DataError> {
    match crate::domain::first_unordered(bars) {
        Some(index) => Err(DataError::Validation(format!(
            "bar {index} at {} is not after the previous bar",
            bars[index].timestamp
        ))),
        None => Ok(()),
    }
}
