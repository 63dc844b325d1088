//! Engine configuration, mutable run state, and run result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EngineError;
use crate::domain::{Account, Position, TradeRecord};
use crate::ledger::{GapPolicy, PositionLedger};
use crate::signal::SignalKind;
use crate::strategy::TradingMode;

/// Trading parameters, read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_balance: f64,
    /// Position notional as a multiple of balance.
    pub leverage: f64,
    /// Stop distance from entry as a fraction of the entry price. 0 disables.
    pub stop_loss: f64,
    /// Orders smaller than this (in base units) are skipped.
    pub min_order_amount: f64,
    /// Order sizes are rounded down to a multiple of this. 0 disables rounding.
    pub amount_step: f64,
    /// Per-trade fee deducted from the return rate at close.
    pub fee_rate: f64,
    pub trading_mode: TradingMode,
    pub gap_policy: GapPolicy,
    /// How the forecast column is to be read.
    pub signal_kind: SignalKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            leverage: 1.0,
            stop_loss: 0.0,
            min_order_amount: 0.0,
            amount_step: 0.0,
            fee_rate: 0.0,
            trading_mode: TradingMode::LongShort,
            gap_policy: GapPolicy::FillAtStop,
            signal_kind: SignalKind::PredictedPrice,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));
        if !(self.initial_balance.is_finite() && self.initial_balance > 0.0) {
            return invalid(format!("initial_balance must be positive, got {}", self.initial_balance));
        }
        if !(self.leverage.is_finite() && self.leverage > 0.0) {
            return invalid(format!("leverage must be positive, got {}", self.leverage));
        }
        if !(0.0..1.0).contains(&self.stop_loss) {
            return invalid(format!("stop_loss must be in [0, 1), got {}", self.stop_loss));
        }
        if !(self.min_order_amount.is_finite() && self.min_order_amount >= 0.0) {
            return invalid(format!("min_order_amount must be >= 0, got {}", self.min_order_amount));
        }
        if !(self.amount_step.is_finite() && self.amount_step >= 0.0) {
            return invalid(format!("amount_step must be >= 0, got {}", self.amount_step));
        }
        if !(0.0..1.0).contains(&self.fee_rate) {
            return invalid(format!("fee_rate must be in [0, 1), got {}", self.fee_rate));
        }
        Ok(())
    }

    /// Order size for `balance` at `price`: `balance * leverage / price`, rounded
    /// down to `amount_step`.
    pub fn order_size(&self, balance: f64, price: f64) -> f64 {
        let raw = balance * self.leverage / price;
        if self.amount_step > 0.0 {
            // Tolerate representation error just below a step boundary.
            (raw / self.amount_step + 1e-9).floor() * self.amount_step
        } else {
            raw
        }
    }
}

/// Mutable state of one run. Owned by the caller so a live run can persist it
/// between ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub ledger: PositionLedger,
    pub account: Account,
    pub trades: Vec<TradeRecord>,
    pub bars_processed: usize,
    /// Bars whose forecast was missing or malformed (held).
    pub skipped_signals: usize,
    /// Open decisions dropped because the order was below the minimum amount.
    pub rejected_orders: usize,
    pub last_bar_time: Option<DateTime<Utc>>,
}

impl RunContext {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ledger: PositionLedger::new(config.fee_rate),
            account: Account::new(config.initial_balance),
            trades: Vec::new(),
            bars_processed: 0,
            skipped_signals: 0,
            rejected_orders: 0,
            last_bar_time: None,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.ledger.position()
    }

    /// Consume the context into a result.
    pub fn into_result(self) -> RunResult {
        RunResult {
            final_balance: self.account.balance,
            account: self.account,
            trades: self.trades,
            bar_count: self.bars_processed,
            skipped_signals: self.skipped_signals,
            rejected_orders: self.rejected_orders,
        }
    }
}

/// Result of a complete backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Closed trades in order, including a final `EndOfData` close if any.
    pub trades: Vec<TradeRecord>,
    pub account: Account,
    pub final_balance: f64,
    pub bar_count: usize,
    pub skipped_signals: usize,
    pub rejected_orders: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_parameters() {
        let bad = [
            EngineConfig { leverage: 0.0, ..Default::default() },
            EngineConfig { stop_loss: 1.0, ..Default::default() },
            EngineConfig { initial_balance: f64::NAN, ..Default::default() },
            EngineConfig { amount_step: -0.1, ..Default::default() },
            EngineConfig { fee_rate: -0.001, ..Default::default() },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(EngineError::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn order_size_rounds_down_to_step() {
        let config = EngineConfig {
            leverage: 3.0,
            amount_step: 0.001,
            ..Default::default()
        };
        // 1000 * 3 / 42_123.45 = 0.07122...
        let size = config.order_size(1_000.0, 42_123.45);
        assert!((size - 0.071).abs() < 1e-12);

        let unrounded = EngineConfig::default().order_size(1_000.0, 400.0);
        assert_eq!(unrounded, 2.5);
    }

    #[test]
    fn context_starts_flat() {
        let ctx = RunContext::new(&EngineConfig::default());
        assert!(ctx.position().is_none());
        assert_eq!(ctx.account.balance, 10_000.0);
        assert!(ctx.last_bar_time.is_none());
    }
}
