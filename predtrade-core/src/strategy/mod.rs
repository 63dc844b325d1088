//! Strategy: decides when to open and close the position.
//!
//! Strategies are pure: the same context and signal always produce the same
//! decision, and no state is carried between calls. This is what keeps a
//! backtest reproducible. Any type implementing [`Strategy`] can replace the
//! default [`ThresholdStrategy`] without touching the engine.
//!
//! The engine guarantees the calling protocol:
//! - `should_open` is only called while flat.
//! - `should_close` is only called while a position is open.
//! - Neither is called with a malformed (non-finite) signal.

pub mod threshold;

pub use threshold::ThresholdStrategy;

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Position, Side};
use crate::signal::Signal;

/// Read-only view of the run handed to a strategy on each bar.
#[derive(Debug, Clone, Copy)]
pub struct MarketContext<'a> {
    pub bar_index: usize,
    /// The bar being decided on. Decisions fill at its close.
    pub bar: &'a Bar,
    /// Realized account balance.
    pub balance: f64,
}

impl MarketContext<'_> {
    pub fn price(&self) -> f64 {
        self.bar.close
    }
}

/// Trait for trading strategies.
pub trait Strategy: Send + Sync {
    /// Human-readable name (e.g., "threshold").
    fn name(&self) -> &str;

    /// Side to open, or `None` to stay flat.
    fn should_open(&self, ctx: &MarketContext<'_>, signal: &Signal) -> Option<Side>;

    /// Whether to close the open position at this bar's close.
    fn should_close(&self, ctx: &MarketContext<'_>, position: &Position, signal: &Signal) -> bool;
}

/// Trading mode: which directions may be opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    LongOnly,
    ShortOnly,
    #[default]
    LongShort,
}

impl TradingMode {
    pub fn allows(self, side: Side) -> bool {
        match self {
            TradingMode::LongOnly => side == Side::Long,
            TradingMode::ShortOnly => side == Side::Short,
            TradingMode::LongShort => true,
        }
    }
}
