//! Position ledger: owns the position lifecycle and leveraged PnL arithmetic.
//!
//! The ledger holds at most one open [`Position`]. Opening while open or closing
//! while flat is a precondition violation: it means the engine driving the ledger
//! is broken, so both surface as [`LedgerError`] and halt the run.
//!
//! Stop-loss prices are fixed at entry:
//! - long: `entry * (1 - stop_loss_rate)`
//! - short: `entry * (1 + stop_loss_rate)`
//!
//! A stop rate of zero disables the stop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Bar, ExitReason, Position, Side, TradeRecord};

/// Precondition violations on the ledger. All are fatal for a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("cannot open {requested} position: a {open} position is already open")]
    AlreadyOpen { open: Side, requested: Side },

    #[error("cannot close: no position is open")]
    NoOpenPosition,

    #[error("invalid order: {0}")]
    InvalidOrder(String),
}

/// How a stop fills when the bar opens beyond the stop price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Always fill at the stop price.
    #[default]
    FillAtStop,
    /// A bar that opens through the stop fills at its open (the worse price).
    FillAtOpen,
}

/// Single-position ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionLedger {
    position: Option<Position>,
    /// Fixed per-trade deduction applied to the return rate at close.
    fee_rate: f64,
}

impl PositionLedger {
    pub fn new(fee_rate: f64) -> Self {
        Self {
            position: None,
            fee_rate,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }

    pub fn fee_rate(&self) -> f64 {
        self.fee_rate
    }

    /// Open a position. Fails if one is already open or the order is malformed.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
        side: Side,
        price: f64,
        leverage: f64,
        size: f64,
        stop_loss_rate: f64,
        opened_at: DateTime<Utc>,
        entry_bar: usize,
    ) -> Result<&Position, LedgerError> {
        if let Some(open) = &self.position {
            return Err(LedgerError::AlreadyOpen {
                open: open.side,
                requested: side,
            });
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(LedgerError::InvalidOrder(format!("entry price {price}")));
        }
        if !(size.is_finite() && size > 0.0) {
            return Err(LedgerError::InvalidOrder(format!("size {size}")));
        }
        if !(leverage.is_finite() && leverage > 0.0) {
            return Err(LedgerError::InvalidOrder(format!("leverage {leverage}")));
        }
        if !(0.0..1.0).contains(&stop_loss_rate) {
            return Err(LedgerError::InvalidOrder(format!(
                "stop loss rate {stop_loss_rate}"
            )));
        }

        let stop_loss_price = if stop_loss_rate > 0.0 {
            Some(price * (1.0 - side.sign() * stop_loss_rate))
        } else {
            None
        };

        Ok(&*self.position.insert(Position {
            side,
            entry_price: price,
            size,
            leverage,
            stop_loss_price,
            opened_at,
            entry_bar,
        }))
    }

    /// Check whether `bar`'s range crossed the stop. Returns the fill price if so.
    ///
    /// Always `None` when flat or when the stop is disabled.
    pub fn check_stop_loss(&self, bar: &Bar, gap_policy: GapPolicy) -> Option<f64> {
        let position = self.position.as_ref()?;
        let stop = position.stop_loss_price?;

        let (hit, gapped) = match position.side {
            Side::Long => (bar.low <= stop, bar.open < stop),
            Side::Short => (bar.high >= stop, bar.open > stop),
        };
        if !hit {
            return None;
        }

        match gap_policy {
            GapPolicy::FillAtOpen if gapped => Some(bar.open),
            _ => Some(stop),
        }
    }

    /// Close the open position at `price` and return the trade record.
    ///
    /// `balance_after` is left at zero; the engine fills it in after booking
    /// the PnL to the account.
    pub fn close(
        &mut self,
        price: f64,
        closed_at: DateTime<Utc>,
        exit_bar: usize,
        exit_reason: ExitReason,
    ) -> Result<TradeRecord, LedgerError> {
        if !(price.is_finite() && price > 0.0) {
            return Err(LedgerError::InvalidOrder(format!("exit price {price}")));
        }
        let position = self.position.take().ok_or(LedgerError::NoOpenPosition)?;

        let pnl_rate = position.return_rate_at(price) - self.fee_rate;
        let pnl_amount = position.margin() * pnl_rate;

        Ok(TradeRecord {
            side: position.side,
            entry_bar: position.entry_bar,
            opened_at: position.opened_at,
            entry_price: position.entry_price,
            exit_bar,
            closed_at,
            exit_price: price,
            exit_reason,
            size: position.size,
            leverage: position.leverage,
            pnl_rate,
            fee_rate: self.fee_rate,
            pnl_amount,
            balance_after: 0.0,
        })
    }
}
