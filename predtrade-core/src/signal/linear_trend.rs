//! Linear trend forecast: least-squares line through the window's closes,
//! extrapolated one bar ahead.
//!
//! A deterministic stand-in for a trained model. Useful for offline runs and as
//! a sanity baseline: if a learned model cannot beat this, it has no edge.

use super::{SignalKind, SignalProvider};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct LinearTrend {
    pub window: usize,
}

impl LinearTrend {
    pub fn new(window: usize) -> Self {
        assert!(window >= 2, "window must be >= 2");
        Self { window }
    }
}

impl SignalProvider for LinearTrend {
    fn name(&self) -> &str {
        "linear_trend"
    }

    fn window_size(&self) -> usize {
        self.window
    }

    fn kind(&self) -> SignalKind {
        SignalKind::PredictedPrice
    }

    fn predict(&self, window: &[Bar]) -> f64 {
        let n = window.len();
        if n < 2 || window.iter().any(|b| b.is_void()) {
            return f64::NAN;
        }
        let nf = n as f64;
        let mean_x = (nf - 1.0) / 2.0;
        let mean_y = window.iter().map(|b| b.close).sum::<f64>() / nf;

        let mut cov = 0.0;
        let mut var = 0.0;
        for (i, bar) in window.iter().enumerate() {
            let dx = i as f64 - mean_x;
            cov += dx * (bar.close - mean_y);
            var += dx * dx;
        }
        let slope = cov / var;
        mean_y + slope * (nf - mean_x)
    }
}
