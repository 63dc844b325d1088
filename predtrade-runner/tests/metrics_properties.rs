//! Property tests for the performance accountant.
//!
//! 1. Idempotence: the same log always yields the same summary
//! 2. Counts partition: wins + losses + flat trades = trade count
//! 3. Compound curve matches the engine's balance chain for unrounded orders
//! 4. Drawdown is within [-1, 0] while the balance stays positive

use chrono::{Duration, TimeZone, Utc};
use predtrade_core::domain::{ExitReason, Side, TradeRecord};
use predtrade_runner::metrics::{
    balance_curve, max_drawdown, BalanceMode, PerformanceSummary, Stat, SummaryOptions,
};
use proptest::prelude::*;

fn arb_trades() -> impl Strategy<Value = Vec<TradeRecord>> {
    prop::collection::vec(
        (
            prop_oneof![Just(0.0), -0.5..0.5_f64],
            prop_oneof![Just(ExitReason::Signal), Just(ExitReason::StopLoss)],
            1usize..20,
        ),
        0..40,
    )
    .prop_map(|rows| {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut balance = 1_000.0;
        let mut bar = 0;
        rows.into_iter()
            .map(|(pnl_rate, exit_reason, held)| {
                let pnl_amount = balance * pnl_rate;
                balance += pnl_amount;
                let trade = TradeRecord {
                    side: Side::Long,
                    entry_bar: bar,
                    opened_at: t0 + Duration::hours(bar as i64),
                    entry_price: 100.0,
                    exit_bar: bar + held,
                    closed_at: t0 + Duration::hours((bar + held) as i64),
                    exit_price: 100.0 * (1.0 + pnl_rate),
                    exit_reason,
                    size: 10.0,
                    leverage: 1.0,
                    pnl_rate,
                    fee_rate: 0.0,
                    pnl_amount,
                    balance_after: balance,
                };
                bar += held + 1;
                trade
            })
            .collect()
    })
}

fn options() -> SummaryOptions {
    SummaryOptions {
        initial_balance: 1_000.0,
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn summary_is_idempotent(trades in arb_trades()) {
        let a = PerformanceSummary::compute(&trades, &options());
        let b = PerformanceSummary::compute(&trades, &options());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn counts_partition_the_log(trades in arb_trades()) {
        let s = PerformanceSummary::compute(&trades, &options());
        let flat = trades.iter().filter(|t| t.pnl_rate == 0.0).count();
        prop_assert_eq!(s.win_count + s.loss_count + flat, s.trade_count);
        prop_assert_eq!(s.win_rate.is_defined(), !trades.is_empty());
        prop_assert_eq!(s.pnl_ratio == Stat::Undefined, s.loss_count == 0);
    }

    #[test]
    fn compound_curve_matches_engine_balances(trades in arb_trades()) {
        let curve = balance_curve(&trades, 1_000.0, BalanceMode::Compound);
        prop_assert_eq!(curve.len(), trades.len() + 1);
        for (point, trade) in curve[1..].iter().zip(&trades) {
            prop_assert!((point - trade.balance_after).abs() < 1e-6 * trade.balance_after.abs().max(1.0));
        }
    }

    #[test]
    fn drawdown_is_bounded(trades in arb_trades()) {
        let curve = balance_curve(&trades, 1_000.0, BalanceMode::Compound);
        let dd = max_drawdown(&curve);
        prop_assert!((-1.0..=0.0).contains(&dd), "drawdown {}", dd);
    }
}
