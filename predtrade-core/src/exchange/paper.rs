//! Paper executor: live-mode stand-in for a real exchange client.
//!
//! Fills at the reference price moved against the trader by a fixed number of
//! basis points, and keeps a log of every fill.

use serde::{Deserialize, Serialize};

use super::{ExchangeError, OrderExecutor};
use crate::domain::{Position, Side};

/// One executed paper order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperFill {
    /// Side of the order itself (a long is closed by a short order).
    pub order_side: Side,
    pub size: f64,
    pub leverage: f64,
    pub reference_price: f64,
    pub fill_price: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PaperExecutor {
    /// Adverse slippage in basis points (e.g., 5 = 0.05%).
    pub slippage_bps: f64,
    fills: Vec<PaperFill>,
}

impl PaperExecutor {
    pub fn new(slippage_bps: f64) -> Self {
        Self {
            slippage_bps,
            fills: Vec::new(),
        }
    }

    pub fn fills(&self) -> &[PaperFill] {
        &self.fills
    }

    fn fill(
        &mut self,
        order_side: Side,
        size: f64,
        leverage: f64,
        reference_price: f64,
    ) -> Result<f64, ExchangeError> {
        if !(reference_price.is_finite() && reference_price > 0.0) {
            return Err(ExchangeError::Rejected(format!(
                "invalid reference price {reference_price}"
            )));
        }
        let slip = reference_price * self.slippage_bps / 10_000.0;
        let fill_price = reference_price + order_side.sign() * slip;
        self.fills.push(PaperFill {
            order_side,
            size,
            leverage,
            reference_price,
            fill_price,
        });
        Ok(fill_price)
    }
}

impl OrderExecutor for PaperExecutor {
    fn name(&self) -> &str {
        "paper"
    }

    fn submit_order(
        &mut self,
        side: Side,
        size: f64,
        leverage: f64,
        reference_price: f64,
    ) -> Result<f64, ExchangeError> {
        self.fill(side, size, leverage, reference_price)
    }

    fn close_order(
        &mut self,
        position: &Position,
        reference_price: f64,
    ) -> Result<f64, ExchangeError> {
        self.fill(
            position.side.inverse(),
            position.size,
            position.leverage,
            reference_price,
        )
    }
}
