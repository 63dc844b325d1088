//! Execution engine: the per-bar state machine and the backtest loop.
//!
//! The engine consumes ordered bars and one forecast per bar, consults the
//! [`Strategy`](crate::strategy::Strategy), and applies its decisions to the
//! [`PositionLedger`](crate::ledger::PositionLedger) through an
//! [`OrderExecutor`](crate::exchange::OrderExecutor). The same
//! [`Engine::process_bar`] drives both the backtest loop and the live tick.

pub mod loop_runner;
pub mod state;
pub mod step;

pub use loop_runner::{run_backtest, run_backtest_with_provider};
pub use state::{EngineConfig, RunContext, RunResult};
pub use step::{BarOutcome, Engine};

use thiserror::Error;

use crate::domain::TradeRecord;
use crate::exchange::ExchangeError;
use crate::ledger::LedgerError;

/// Errors from the engine state machine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("order execution failed: {0}")]
    Execution(#[from] ExchangeError),

    #[error("invalid engine config: {0}")]
    InvalidConfig(String),

    #[error("input mismatch: {signals} signals for {bars} bars")]
    InputMismatch { bars: usize, signals: usize },

    #[error("bar {index} is not after its predecessor")]
    UnorderedBars { index: usize },
}

/// A fatal backtest failure, with the trades closed before it.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct BacktestError {
    /// Bar being processed when the run failed; `None` for input validation.
    pub bar_index: Option<usize>,
    pub source: EngineError,
    /// Trades closed before the failure.
    pub trades: Vec<TradeRecord>,
}

impl std::fmt::Display for BacktestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.bar_index {
            Some(i) => write!(f, "backtest aborted at bar {i}: {}", self.source),
            None => write!(f, "backtest rejected: {}", self.source),
        }
    }
}
