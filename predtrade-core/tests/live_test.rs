//! Integration tests for the live tick.
//!
//! Tests:
//! 1. A tick trades the newest closed bar with the rolling window
//! 2. Re-running a tick on the same bar is reported, not re-traded
//! 3. Consecutive ticks carry the position across invocations, and bars
//!    missed between ticks are still stop-checked
//! 4. Failures (data, insufficient window) leave the context untouched
//! 5. State file persistence

use chrono::{DateTime, Duration, TimeZone, Utc};
use predtrade_core::data::{BarSource, DataError, Interval};
use predtrade_core::domain::{Bar, ExitReason, Side};
use predtrade_core::engine::{EngineConfig, RunContext};
use predtrade_core::exchange::PaperExecutor;
use predtrade_core::live::{load_context, save_context, LiveError, LiveTrader, TickReport};
use predtrade_core::signal::{FnProvider, SignalKind};
use predtrade_core::strategy::ThresholdStrategy;

// ── Helpers ──────────────────────────────────────────────────────────

struct FixedSource(Vec<Bar>);

impl BarSource for FixedSource {
    fn name(&self) -> &str {
        "fixed"
    }

    fn fetch_bars(
        &self,
        _symbol: &str,
        _interval: Interval,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, DataError> {
        Ok(self
            .0
            .iter()
            .filter(|b| b.timestamp >= start && end.map_or(true, |e| b.timestamp < e))
            .cloned()
            .collect())
    }
}

struct DownSource;

impl BarSource for DownSource {
    fn name(&self) -> &str {
        "down"
    }

    fn fetch_bars(
        &self,
        _: &str,
        _: Interval,
        _: DateTime<Utc>,
        _: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, DataError> {
        Err(DataError::Network("connection refused".into()))
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

fn hourly(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar {
            timestamp: t0() + Duration::hours(i as i64),
            open: c,
            high: c * 1.001,
            low: c * 0.999,
            close: c,
            volume: 10.0,
        })
        .collect()
}

/// Forecasts the next close as `factor` times the last one.
fn scaled(factor: f64) -> impl Fn(&[Bar]) -> f64 + Send + Sync {
    move |w: &[Bar]| w[w.len() - 1].close * factor
}

fn config() -> EngineConfig {
    EngineConfig {
        initial_balance: 1_000.0,
        leverage: 2.0,
        ..Default::default()
    }
}

// ── 1. First tick ────────────────────────────────────────────────────

#[test]
fn tick_opens_on_newest_closed_bar() {
    let source = FixedSource(hourly(&[100.0; 10]));
    let provider = FnProvider::new("up", 3, SignalKind::PredictedPrice, scaled(1.02));
    let strategy = ThresholdStrategy::new(0.01);
    let config = config();
    let trader = LiveTrader {
        source: &source,
        provider: &provider,
        strategy: &strategy,
        config: &config,
        symbol: "BTC/USDT:USDT",
        interval: Interval::H1,
    };
    let mut ctx = RunContext::new(&config);
    let mut exec = PaperExecutor::new(0.0);

    let report = trader.tick(&mut ctx, &mut exec, t0() + Duration::hours(10)).unwrap();
    let TickReport::Processed { bar_time, outcome, .. } = report else {
        panic!("expected a processed tick");
    };
    assert_eq!(bar_time, t0() + Duration::hours(9));
    let position = outcome.opened.expect("should open");
    assert_eq!(position.side, Side::Long);
    assert_eq!(position.size, 20.0);
    assert_eq!(ctx.last_bar_time, Some(bar_time));
    assert_eq!(exec.fills().len(), 1);
}

// ── 2. Idempotence ───────────────────────────────────────────────────

#[test]
fn same_bar_is_not_traded_twice() {
    let source = FixedSource(hourly(&[100.0; 10]));
    let provider = FnProvider::new("up", 3, SignalKind::PredictedPrice, scaled(1.02));
    let strategy = ThresholdStrategy::new(0.01);
    let config = config();
    let trader = LiveTrader {
        source: &source,
        provider: &provider,
        strategy: &strategy,
        config: &config,
        symbol: "BTCUSDT",
        interval: Interval::H1,
    };
    let mut ctx = RunContext::new(&config);
    let mut exec = PaperExecutor::new(0.0);
    let now = t0() + Duration::hours(10);

    trader.tick(&mut ctx, &mut exec, now).unwrap();
    let after_first = ctx.clone();
    let report = trader.tick(&mut ctx, &mut exec, now + Duration::minutes(5)).unwrap();

    assert_eq!(
        report,
        TickReport::AlreadyProcessed {
            bar_time: t0() + Duration::hours(9)
        }
    );
    assert_eq!(ctx, after_first);
    assert_eq!(exec.fills().len(), 1);
}

// ── 3. Position carried across ticks ─────────────────────────────────

#[test]
fn next_tick_closes_on_reversal() {
    let config = config();
    let strategy = ThresholdStrategy::new(0.01);
    let mut ctx = RunContext::new(&config);
    let mut exec = PaperExecutor::new(0.0);

    let mut closes = vec![100.0; 10];
    let up = FnProvider::new("up", 3, SignalKind::PredictedPrice, scaled(1.02));
    let source = FixedSource(hourly(&closes));
    LiveTrader {
        source: &source,
        provider: &up,
        strategy: &strategy,
        config: &config,
        symbol: "BTCUSDT",
        interval: Interval::H1,
    }
    .tick(&mut ctx, &mut exec, t0() + Duration::hours(10))
    .unwrap();
    assert!(ctx.ledger.is_open());

    closes.push(110.0);
    let down = FnProvider::new("down", 3, SignalKind::PredictedPrice, scaled(0.97));
    let source = FixedSource(hourly(&closes));
    let report = LiveTrader {
        source: &source,
        provider: &down,
        strategy: &strategy,
        config: &config,
        symbol: "BTCUSDT",
        interval: Interval::H1,
    }
    .tick(&mut ctx, &mut exec, t0() + Duration::hours(11))
    .unwrap();

    let TickReport::Processed { outcome, .. } = report else {
        panic!("expected a processed tick");
    };
    let trade = outcome.closed.expect("should close");
    assert_eq!(trade.exit_reason, ExitReason::Signal);
    assert_eq!(trade.exit_price, 110.0);
    assert!((trade.pnl_rate - 0.2).abs() < 1e-9);
    assert!(!ctx.ledger.is_open());
    assert_eq!(ctx.trades.len(), 1);
    assert_eq!(ctx.bars_processed, 2);
}

#[test]
fn stop_breach_on_missed_bar_closes_position() {
    let config = EngineConfig {
        stop_loss: 0.03,
        ..config()
    };
    let strategy = ThresholdStrategy::new(0.01);
    let up = FnProvider::new("up", 3, SignalKind::PredictedPrice, scaled(1.02));
    let mut ctx = RunContext::new(&config);
    let mut exec = PaperExecutor::new(0.0);

    let mut bars = hourly(&[100.0; 12]);
    let first = FixedSource(bars[..10].to_vec());
    LiveTrader {
        source: &first,
        provider: &up,
        strategy: &strategy,
        config: &config,
        symbol: "BTCUSDT",
        interval: Interval::H1,
    }
    .tick(&mut ctx, &mut exec, t0() + Duration::hours(10))
    .unwrap();
    assert!(ctx.ledger.is_open());

    // The tick for bar 10 never ran; its low went through the 97 stop.
    bars[10].low = 95.0;
    let source = FixedSource(bars);
    let report = LiveTrader {
        source: &source,
        provider: &up,
        strategy: &strategy,
        config: &config,
        symbol: "BTCUSDT",
        interval: Interval::H1,
    }
    .tick(&mut ctx, &mut exec, t0() + Duration::hours(12))
    .unwrap();

    let TickReport::Processed {
        missed_stop,
        outcome,
        ..
    } = report
    else {
        panic!("expected a processed tick");
    };
    let trade = missed_stop.expect("missed bar should hit the stop");
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert!((trade.exit_price - 97.0).abs() < 1e-9);
    assert_eq!(trade.closed_at, t0() + Duration::hours(10));
    assert_eq!(trade.exit_bar, 1);
    assert!(outcome.closed.is_none());
    assert!(outcome.opened.is_some(), "newest bar starts flat and may open");
    assert_eq!(ctx.trades.len(), 1);
    assert_eq!(ctx.bars_processed, 3);
    assert_eq!(ctx.last_bar_time, Some(t0() + Duration::hours(11)));
}

#[test]
fn missed_bar_without_breach_keeps_position() {
    let config = EngineConfig {
        stop_loss: 0.03,
        ..config()
    };
    let strategy = ThresholdStrategy::new(0.01);
    let up = FnProvider::new("up", 3, SignalKind::PredictedPrice, scaled(1.02));
    let mut ctx = RunContext::new(&config);
    let mut exec = PaperExecutor::new(0.0);

    let bars = hourly(&[100.0; 12]);
    let first = FixedSource(bars[..10].to_vec());
    LiveTrader {
        source: &first,
        provider: &up,
        strategy: &strategy,
        config: &config,
        symbol: "BTCUSDT",
        interval: Interval::H1,
    }
    .tick(&mut ctx, &mut exec, t0() + Duration::hours(10))
    .unwrap();

    let source = FixedSource(bars);
    let report = LiveTrader {
        source: &source,
        provider: &up,
        strategy: &strategy,
        config: &config,
        symbol: "BTCUSDT",
        interval: Interval::H1,
    }
    .tick(&mut ctx, &mut exec, t0() + Duration::hours(12))
    .unwrap();

    let TickReport::Processed { missed_stop, .. } = report else {
        panic!("expected a processed tick");
    };
    assert!(missed_stop.is_none());
    assert!(ctx.ledger.is_open());
    assert!(ctx.trades.is_empty());
    assert_eq!(ctx.bars_processed, 3);
}

// ── 4. Failures ──────────────────────────────────────────────────────

#[test]
fn data_failure_leaves_context_untouched() {
    let provider = FnProvider::new("up", 3, SignalKind::PredictedPrice, scaled(1.02));
    let strategy = ThresholdStrategy::new(0.01);
    let config = config();
    let trader = LiveTrader {
        source: &DownSource,
        provider: &provider,
        strategy: &strategy,
        config: &config,
        symbol: "BTCUSDT",
        interval: Interval::H1,
    };
    let mut ctx = RunContext::new(&config);
    let before = ctx.clone();

    let err = trader
        .tick(&mut ctx, &mut PaperExecutor::new(0.0), t0())
        .unwrap_err();
    assert!(matches!(err, LiveError::Data(DataError::Network(_))));
    assert_eq!(ctx, before);
}

#[test]
fn short_window_is_insufficient_data() {
    let source = FixedSource(hourly(&[100.0; 4]));
    let provider = FnProvider::new("up", 24, SignalKind::PredictedPrice, scaled(1.02));
    let strategy = ThresholdStrategy::new(0.01);
    let config = config();
    let trader = LiveTrader {
        source: &source,
        provider: &provider,
        strategy: &strategy,
        config: &config,
        symbol: "BTCUSDT",
        interval: Interval::H1,
    };
    let mut ctx = RunContext::new(&config);

    let err = trader
        .tick(&mut ctx, &mut PaperExecutor::new(0.0), t0() + Duration::hours(4))
        .unwrap_err();
    assert!(matches!(err, LiveError::InsufficientData { needed: 24, got: 4 }));
    assert_eq!(ctx.bars_processed, 0);
}

#[test]
fn oversized_window_is_a_data_error() {
    let source = FixedSource(hourly(&[100.0; 4]));
    let provider = FnProvider::new("huge", usize::MAX / 2, SignalKind::PredictedPrice, scaled(1.02));
    let strategy = ThresholdStrategy::new(0.01);
    let config = config();
    let trader = LiveTrader {
        source: &source,
        provider: &provider,
        strategy: &strategy,
        config: &config,
        symbol: "BTCUSDT",
        interval: Interval::H1,
    };
    let mut ctx = RunContext::new(&config);

    let err = trader
        .tick(&mut ctx, &mut PaperExecutor::new(0.0), t0() + Duration::hours(4))
        .unwrap_err();
    assert!(matches!(err, LiveError::Data(DataError::Validation(_))));
    assert_eq!(ctx, RunContext::new(&config));
}

// ── 5. Persistence ───────────────────────────────────────────────────

#[test]
fn state_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let config = config();

    let fresh = load_context(&path, "BTCUSDT", &config).unwrap();
    assert_eq!(fresh, RunContext::new(&config));

    let mut ctx = fresh;
    ctx.bars_processed = 7;
    ctx.last_bar_time = Some(t0());
    save_context(&path, "BTCUSDT", &ctx).unwrap();

    let loaded = load_context(&path, "BTCUSDT", &config).unwrap();
    assert_eq!(loaded, ctx);

    let err = load_context(&path, "ETHUSDT", &config).unwrap_err();
    assert!(matches!(err, LiveError::State { .. }));
}
