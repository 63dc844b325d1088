//! Order execution port.
//!
//! The engine never prices a fill itself: it hands a reference price (the bar
//! close, or the stop price) to an [`OrderExecutor`] and books whatever fill
//! price comes back. A backtest plugs in [`SimulatedExecutor`], which fills at
//! the reference exactly; a live run plugs in an exchange client. The state
//! machine is identical in both cases.

pub mod paper;

pub use paper::{PaperExecutor, PaperFill};

use thiserror::Error;

use crate::domain::{Position, Side};

/// Failures reported by an order executor.
///
/// In live mode these abort the current tick only; the engine does not retry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("order rejected by exchange: {0}")]
    Rejected(String),

    #[error("insufficient margin for {size} units at leverage {leverage}")]
    InsufficientMargin { size: f64, leverage: f64 },

    #[error("exchange error: {0}")]
    Other(String),
}

/// Trait for order executors.
pub trait OrderExecutor: Send {
    /// Human-readable name (e.g., "simulated", "paper").
    fn name(&self) -> &str;

    /// Open a position. Returns the fill price.
    fn submit_order(
        &mut self,
        side: Side,
        size: f64,
        leverage: f64,
        reference_price: f64,
    ) -> Result<f64, ExchangeError>;

    /// Close `position` in full. Returns the fill price.
    fn close_order(&mut self, position: &Position, reference_price: f64)
        -> Result<f64, ExchangeError>;
}

/// Backtest executor: every order fills at its reference price.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedExecutor;

impl OrderExecutor for SimulatedExecutor {
    fn name(&self) -> &str {
        "simulated"
    }

    fn submit_order(
        &mut self,
        _side: Side,
        _size: f64,
        _leverage: f64,
        reference_price: f64,
    ) -> Result<f64, ExchangeError> {
        Ok(reference_price)
    }

    fn close_order(
        &mut self,
        _position: &Position,
        reference_price: f64,
    ) -> Result<f64, ExchangeError> {
        Ok(reference_price)
    }
}
