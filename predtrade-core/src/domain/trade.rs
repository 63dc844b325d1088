//! TradeRecord: a completed round-trip trade.

use super::side::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The strategy asked to close at the bar close.
    Signal,
    /// The intrabar stop-loss threshold was crossed.
    StopLoss,
    /// Force-closed at the final bar of the series for reporting.
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::Signal => "signal",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::EndOfData => "end_of_data",
        };
        f.write_str(s)
    }
}

/// A complete round-trip trade record: entry → exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: Side,

    // ── Entry ──
    pub entry_bar: usize,
    pub opened_at: DateTime<Utc>,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_bar: usize,
    pub closed_at: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── Size ──
    pub size: f64,
    pub leverage: f64,

    // ── PnL ──
    /// Leveraged simple return of the trade, net of `fee_rate`.
    pub pnl_rate: f64,
    /// Fixed per-trade deduction already included in `pnl_rate`.
    pub fee_rate: f64,
    /// Realized PnL in quote currency (margin * pnl_rate).
    pub pnl_amount: f64,
    /// Account balance right after this trade closed.
    pub balance_after: f64,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.pnl_rate > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.pnl_rate < 0.0
    }

    pub fn is_stop_loss(&self) -> bool {
        self.exit_reason == ExitReason::StopLoss
    }

    /// True for the artificial tail close at the end of the bar series.
    pub fn is_forced_close(&self) -> bool {
        self.exit_reason == ExitReason::EndOfData
    }

    pub fn bars_held(&self) -> usize {
        self.exit_bar.saturating_sub(self.entry_bar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_trade() -> TradeRecord {
        TradeRecord {
            side: Side::Long,
            entry_bar: 4,
            opened_at: Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
            entry_price: 100.0,
            exit_bar: 8,
            closed_at: Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap(),
            exit_price: 110.0,
            exit_reason: ExitReason::Signal,
            size: 10.0,
            leverage: 1.0,
            pnl_rate: 0.10,
            fee_rate: 0.0,
            pnl_amount: 100.0,
            balance_after: 1_100.0,
        }
    }

    #[test]
    fn winner_and_duration() {
        let trade = sample_trade();
        assert!(trade.is_winner());
        assert!(!trade.is_loser());
        assert_eq!(trade.bars_held(), 4);
    }

    #[test]
    fn forced_close_flag() {
        let mut trade = sample_trade();
        assert!(!trade.is_forced_close());
        trade.exit_reason = ExitReason::EndOfData;
        assert!(trade.is_forced_close());
    }

    #[test]
    fn exit_reason_serializes_snake_case() {
        let json = serde_json::to_string(&ExitReason::StopLoss).unwrap();
        assert_eq!(json, "\"stop_loss\"");
    }
}
