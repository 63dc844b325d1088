//! Threshold strategy: trade when the forecast moves far enough from price.
//!
//! Open: `|expected_return| > threshold`, long if the forecast is above the
//! close, short if below.
//! Close: the directional expected return (`sign(side) * expected_return`)
//! drops below `exit_threshold`. With the default of zero this is a pure
//! reversal exit; a positive value also exits when conviction decays.

use serde::{Deserialize, Serialize};

use super::{MarketContext, Strategy};
use crate::domain::{Position, Side};
use crate::signal::Signal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdStrategy {
    pub threshold: f64,
    #[serde(default)]
    pub exit_threshold: f64,
}

impl ThresholdStrategy {
    pub fn new(threshold: f64) -> Self {
        assert!(threshold >= 0.0, "threshold must be non-negative");
        Self {
            threshold,
            exit_threshold: 0.0,
        }
    }

    pub fn with_exit_threshold(mut self, exit_threshold: f64) -> Self {
        self.exit_threshold = exit_threshold;
        self
    }
}

impl Strategy for ThresholdStrategy {
    fn name(&self) -> &str {
        "threshold"
    }

    fn should_open(&self, ctx: &MarketContext<'_>, signal: &Signal) -> Option<Side> {
        let r = signal.expected_return(ctx.price());
        if r.abs() <= self.threshold {
            return None;
        }
        Some(if r > 0.0 { Side::Long } else { Side::Short })
    }

    fn should_close(&self, ctx: &MarketContext<'_>, position: &Position, signal: &Signal) -> bool {
        let directional = position.side.sign() * signal.expected_return(ctx.price());
        directional < self.exit_threshold
    }
}
