//! Performance accountant: pure functions that fold a trade log into statistics.
//!
//! Every metric is a pure function of the trade list (and, for the balance
//! curve, a starting balance). Running the accountant twice on the same log
//! gives the same summary.
//!
//! Statistics that have no meaning for a given log (win rate with no trades,
//! P&L ratio with no losing trades) are [`Stat::Undefined`], never 0 or ∞.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use predtrade_core::domain::TradeRecord;

/// A statistic that may be undefined for the given trade log.
///
/// Serializes as a number, or `null` when undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stat {
    Value(f64),
    Undefined,
}

impl Stat {
    pub fn value(self) -> Option<f64> {
        match self {
            Stat::Value(v) => Some(v),
            Stat::Undefined => None,
        }
    }

    pub fn is_defined(self) -> bool {
        matches!(self, Stat::Value(_))
    }
}

impl From<Option<f64>> for Stat {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Stat::Undefined, Stat::Value)
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stat::Value(v) => match f.precision() {
                Some(p) => write!(f, "{v:.p$}"),
                None => write!(f, "{v}"),
            },
            Stat::Undefined => f.write_str("undefined"),
        }
    }
}

/// How per-trade returns accumulate into a balance curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceMode {
    /// `balance *= 1 + pnl_rate`: each trade risks the whole current balance.
    /// Matches the engine's own bookkeeping when orders are not rounded.
    #[default]
    Compound,
    /// `balance += initial * pnl_rate`: every trade risks the starting balance.
    Simple,
}

/// Options for [`PerformanceSummary::compute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryOptions {
    pub initial_balance: f64,
    pub balance_mode: BalanceMode,
    /// Leave the artificial end-of-data close out of every statistic.
    pub exclude_forced_closes: bool,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            balance_mode: BalanceMode::Compound,
            exclude_forced_closes: false,
        }
    }
}

/// Aggregate statistics for one trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub trade_count: usize,
    pub win_count: usize,
    pub loss_count: usize,
    pub win_rate: Stat,
    /// Mean winning pnl_rate over mean |losing pnl_rate|.
    pub pnl_ratio: Stat,
    pub max_profit_rate: Stat,
    pub max_loss_rate: Stat,
    pub mean_pnl_rate: Stat,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_return: f64,
    /// Worst peak-to-trough decline of the balance curve, as a non-positive fraction.
    pub max_drawdown: f64,
    pub stop_loss_exits: usize,
    pub forced_closes: usize,
    pub avg_bars_held: Stat,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub balance_mode: BalanceMode,
}

impl PerformanceSummary {
    /// Fold a trade log into a summary.
    pub fn compute(trades: &[TradeRecord], options: &SummaryOptions) -> Self {
        let counted: Vec<TradeRecord> = if options.exclude_forced_closes {
            trades.iter().filter(|t| !t.is_forced_close()).cloned().collect()
        } else {
            trades.to_vec()
        };
        let trades = counted.as_slice();

        let curve = balance_curve(trades, options.initial_balance, options.balance_mode);
        let final_balance = curve.last().copied().unwrap_or(options.initial_balance);
        let total_return = if options.initial_balance > 0.0 {
            (final_balance - options.initial_balance) / options.initial_balance
        } else {
            0.0
        };

        Self {
            trade_count: trades.len(),
            win_count: trades.iter().filter(|t| t.is_winner()).count(),
            loss_count: trades.iter().filter(|t| t.is_loser()).count(),
            win_rate: win_rate(trades),
            pnl_ratio: pnl_ratio(trades),
            max_profit_rate: max_profit_rate(trades),
            max_loss_rate: max_loss_rate(trades),
            mean_pnl_rate: mean_pnl_rate(trades),
            initial_balance: options.initial_balance,
            final_balance,
            total_return,
            max_drawdown: max_drawdown(&curve),
            stop_loss_exits: trades.iter().filter(|t| t.is_stop_loss()).count(),
            forced_closes: trades.iter().filter(|t| t.is_forced_close()).count(),
            avg_bars_held: avg_bars_held(trades),
            max_consecutive_wins: max_consecutive(trades, true),
            max_consecutive_losses: max_consecutive(trades, false),
            balance_mode: options.balance_mode,
        }
    }

    /// Flatten into named fields, for CSV rows and log lines.
    pub fn to_field_map(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("trade_count", self.trade_count.to_string()),
            ("win_count", self.win_count.to_string()),
            ("loss_count", self.loss_count.to_string()),
            ("win_rate", self.win_rate.to_string()),
            ("pnl_ratio", self.pnl_ratio.to_string()),
            ("max_profit_rate", self.max_profit_rate.to_string()),
            ("max_loss_rate", self.max_loss_rate.to_string()),
            ("mean_pnl_rate", self.mean_pnl_rate.to_string()),
            ("initial_balance", self.initial_balance.to_string()),
            ("final_balance", self.final_balance.to_string()),
            ("total_return", self.total_return.to_string()),
            ("max_drawdown", self.max_drawdown.to_string()),
            ("stop_loss_exits", self.stop_loss_exits.to_string()),
            ("forced_closes", self.forced_closes.to_string()),
            ("avg_bars_held", self.avg_bars_held.to_string()),
            ("max_consecutive_wins", self.max_consecutive_wins.to_string()),
            ("max_consecutive_losses", self.max_consecutive_losses.to_string()),
            (
                "balance_mode",
                match self.balance_mode {
                    BalanceMode::Compound => "compound".to_string(),
                    BalanceMode::Simple => "simple".to_string(),
                },
            ),
        ])
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Fraction of trades with a positive pnl_rate.
pub fn win_rate(trades: &[TradeRecord]) -> Stat {
    if trades.is_empty() {
        return Stat::Undefined;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    Stat::Value(winners as f64 / trades.len() as f64)
}

/// Mean winning pnl_rate divided by mean absolute losing pnl_rate.
///
/// Undefined without losing trades. With losers but no winners it is 0.
pub fn pnl_ratio(trades: &[TradeRecord]) -> Stat {
    let losses: Vec<f64> = trades
        .iter()
        .filter(|t| t.is_loser())
        .map(|t| t.pnl_rate.abs())
        .collect();
    if losses.is_empty() {
        return Stat::Undefined;
    }
    let wins: Vec<f64> = trades
        .iter()
        .filter(|t| t.is_winner())
        .map(|t| t.pnl_rate)
        .collect();
    Stat::Value(mean_f64(&wins) / mean_f64(&losses))
}

/// Best single-trade pnl_rate.
pub fn max_profit_rate(trades: &[TradeRecord]) -> Stat {
    trades.iter().map(|t| t.pnl_rate).reduce(f64::max).into()
}

/// Worst single-trade pnl_rate.
pub fn max_loss_rate(trades: &[TradeRecord]) -> Stat {
    trades.iter().map(|t| t.pnl_rate).reduce(f64::min).into()
}

pub fn mean_pnl_rate(trades: &[TradeRecord]) -> Stat {
    if trades.is_empty() {
        return Stat::Undefined;
    }
    Stat::Value(trades.iter().map(|t| t.pnl_rate).sum::<f64>() / trades.len() as f64)
}

pub fn avg_bars_held(trades: &[TradeRecord]) -> Stat {
    if trades.is_empty() {
        return Stat::Undefined;
    }
    Stat::Value(trades.iter().map(|t| t.bars_held() as f64).sum::<f64>() / trades.len() as f64)
}

/// Balance after each trade, starting with `initial`. Length is `trades.len() + 1`.
pub fn balance_curve(trades: &[TradeRecord], initial: f64, mode: BalanceMode) -> Vec<f64> {
    let mut curve = Vec::with_capacity(trades.len() + 1);
    let mut balance = initial;
    curve.push(balance);
    for trade in trades {
        balance = match mode {
            BalanceMode::Compound => balance * (1.0 + trade.pnl_rate),
            BalanceMode::Simple => balance + initial * trade.pnl_rate,
        };
        curve.push(balance);
    }
    curve
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// Returns 0.0 if the curve never falls below a previous peak.
pub fn max_drawdown(curve: &[f64]) -> f64 {
    if curve.len() < 2 {
        return 0.0;
    }
    let mut peak = curve[0];
    let mut max_dd = 0.0_f64;

    for &balance in curve {
        if balance > peak {
            peak = balance;
        }
        if peak > 0.0 {
            let dd = (balance - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

// ─── Helpers ────────────────────────────────────────────────────────

fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn max_consecutive(trades: &[TradeRecord], winners: bool) -> usize {
    let mut max_streak = 0;
    let mut current = 0;

    for trade in trades {
        let hit = if winners { trade.is_winner() } else { trade.is_loser() };
        if hit {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}
