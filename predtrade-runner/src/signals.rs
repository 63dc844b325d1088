//! Precomputed model predictions.
//!
//! Model inference usually runs out of process. Its output is a CSV of
//! `timestamp,prediction` that gets aligned to the bar series by timestamp:
//! bars with no matching row, or an empty prediction cell, get NaN and are
//! held by the engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use predtrade_core::data::csv_source::parse_timestamp;
use predtrade_core::data::DataError;
use predtrade_core::domain::Bar;

#[derive(Debug, Error)]
pub enum SignalLoadError {
    #[error("failed to read predictions {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("predictions {path} row {row}: {message}")]
    Row {
        path: PathBuf,
        row: usize,
        message: String,
    },

    #[error("predictions {path}: duplicate timestamp {timestamp}")]
    Duplicate {
        path: PathBuf,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Deserialize)]
struct PredictionRow {
    timestamp: String,
    prediction: Option<f64>,
}

/// Read a predictions file into a timestamp-keyed map.
pub fn read_predictions(path: &Path) -> Result<HashMap<DateTime<Utc>, f64>, SignalLoadError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| SignalLoadError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let row_err = |row: usize, message: String| SignalLoadError::Row {
        path: path.to_path_buf(),
        row,
        message,
    };

    let mut out = HashMap::new();
    for (i, record) in reader.deserialize::<PredictionRow>().enumerate() {
        let record = record.map_err(|e| row_err(i + 1, e.to_string()))?;
        let timestamp = parse_timestamp(&record.timestamp).map_err(|e| match e {
            DataError::Validation(msg) => row_err(i + 1, msg),
            other => row_err(i + 1, other.to_string()),
        })?;
        // An empty cell means the model produced nothing for this bar.
        let value = record.prediction.unwrap_or(f64::NAN);
        if out.insert(timestamp, value).is_some() {
            return Err(SignalLoadError::Duplicate {
                path: path.to_path_buf(),
                timestamp,
            });
        }
    }
    Ok(out)
}

/// One forecast per bar, aligned by timestamp. Missing rows become NaN.
pub fn load_predictions(path: &Path, bars: &[Bar]) -> Result<Vec<f64>, SignalLoadError> {
    let predictions = read_predictions(path)?;
    let aligned: Vec<f64> = bars
        .iter()
        .map(|b| predictions.get(&b.timestamp).copied().unwrap_or(f64::NAN))
        .collect();

    let matched = aligned.iter().filter(|v| v.is_finite()).count();
    if matched == 0 && !bars.is_empty() {
        tracing::warn!(
            path = %path.display(),
            rows = predictions.len(),
            "no prediction matched any bar timestamp"
        );
    } else {
        tracing::debug!(matched, bars = bars.len(), "aligned predictions");
    }
    Ok(aligned)
}
