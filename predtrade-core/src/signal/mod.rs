//! Signal generation: wraps a prediction function behind a trait.
//!
//! A provider sees only a trailing window of bars and returns one scalar
//! forecast. Model inference lives behind this seam, so the engine can be driven
//! by deterministic stand-ins in tests and by real model output in production.
//! A forecast that is NaN or infinite is "malformed": the engine treats that bar
//! as a hold and never passes it to a strategy.

pub mod closure;
pub mod linear_trend;

pub use closure::FnProvider;
pub use linear_trend::LinearTrend;

use serde::{Deserialize, Serialize};

use crate::domain::Bar;

/// How a forecast value should be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// The forecast is the predicted next close.
    #[default]
    PredictedPrice,
    /// The forecast is the predicted simple return of the next close.
    PredictedReturn,
}

/// A well-formed forecast for one bar. Only constructed from finite values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub bar_index: usize,
    pub value: f64,
    pub kind: SignalKind,
}

impl Signal {
    /// Returns `None` for malformed (non-finite) forecasts.
    pub fn new(bar_index: usize, value: f64, kind: SignalKind) -> Option<Self> {
        value.is_finite().then_some(Self {
            bar_index,
            value,
            kind,
        })
    }

    /// Expected simple return from `current_price` to the forecast.
    pub fn expected_return(&self, current_price: f64) -> f64 {
        match self.kind {
            SignalKind::PredictedPrice => (self.value - current_price) / current_price,
            SignalKind::PredictedReturn => self.value,
        }
    }

    /// Forecast expressed as a price.
    pub fn predicted_price(&self, current_price: f64) -> f64 {
        match self.kind {
            SignalKind::PredictedPrice => self.value,
            SignalKind::PredictedReturn => current_price * (1.0 + self.value),
        }
    }
}

/// Trait for forecast providers (model inference).
///
/// `predict` must be deterministic for identical windows so backtests reproduce.
pub trait SignalProvider: Send + Sync {
    /// Human-readable name (e.g., "linear_trend").
    fn name(&self) -> &str;

    /// Number of trailing bars fed to `predict`.
    fn window_size(&self) -> usize;

    /// How the returned value is to be interpreted.
    fn kind(&self) -> SignalKind;

    /// Forecast from a window of exactly `window_size()` bars, oldest first.
    fn predict(&self, window: &[Bar]) -> f64;
}

/// Run a provider over a full bar series, one forecast per bar.
///
/// Bars before the first full window get NaN (treated as hold by the engine).
pub fn compute_signals(provider: &dyn SignalProvider, bars: &[Bar]) -> Vec<f64> {
    let window = provider.window_size().max(1);
    (0..bars.len())
        .map(|i| {
            if i + 1 < window {
                f64::NAN
            } else {
                provider.predict(&bars[i + 1 - window..=i])
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: t0 + chrono::Duration::hours(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(Signal::new(0, f64::NAN, SignalKind::PredictedPrice).is_none());
        assert!(Signal::new(0, f64::INFINITY, SignalKind::PredictedReturn).is_none());
        assert!(Signal::new(0, 0.0, SignalKind::PredictedReturn).is_some());
    }

    #[test]
    fn price_forecast_converts_to_return() {
        let s = Signal::new(0, 102.0, SignalKind::PredictedPrice).unwrap();
        assert!((s.expected_return(100.0) - 0.02).abs() < 1e-12);
        assert_eq!(s.predicted_price(100.0), 102.0);
    }

    #[test]
    fn return_forecast_converts_to_price() {
        let s = Signal::new(0, -0.01, SignalKind::PredictedReturn).unwrap();
        assert_eq!(s.expected_return(100.0), -0.01);
        assert!((s.predicted_price(100.0) - 99.0).abs() < 1e-12);
    }

    #[test]
    fn compute_signals_pads_warmup_with_nan() {
        let provider = FnProvider::new("last_close", 3, SignalKind::PredictedPrice, |w: &[Bar]| {
            w.last().map(|b| b.close).unwrap_or(f64::NAN)
        });
        let out = compute_signals(&provider, &bars(&[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(out.len(), 4);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_eq!(out[2], 3.0);
        assert_eq!(out[3], 4.0);
    }

    #[test]
    fn window_sees_only_past_bars() {
        let provider = FnProvider::new("window_len", 2, SignalKind::PredictedReturn, |w: &[Bar]| {
            w.len() as f64
        });
        let out = compute_signals(&provider, &bars(&[1.0, 2.0, 3.0]));
        assert_eq!(&out[1..], &[2.0, 2.0]);
    }
}
