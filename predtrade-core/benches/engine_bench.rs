//! Criterion benchmarks for predtrade hot paths.
//!
//! Benchmarks:
//! 1. Backtest loop over precomputed forecasts
//! 2. Signal precompute with the linear-trend provider
//! 3. Single-bar state machine step

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use predtrade_core::data::{Interval, SyntheticSource};
use predtrade_core::domain::Bar;
use predtrade_core::engine::{run_backtest, Engine, EngineConfig, RunContext};
use predtrade_core::exchange::SimulatedExecutor;
use predtrade_core::signal::{compute_signals, LinearTrend, SignalKind};
use predtrade_core::strategy::ThresholdStrategy;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
    SyntheticSource::new(7).generate(start, Interval::H1, n).unwrap()
}

fn config() -> EngineConfig {
    EngineConfig {
        leverage: 3.0,
        stop_loss: 0.02,
        signal_kind: SignalKind::PredictedPrice,
        ..Default::default()
    }
}

// ── 1. Backtest loop ─────────────────────────────────────────────────

fn bench_backtest(c: &mut Criterion) {
    let mut group = c.benchmark_group("backtest_loop");
    let strategy = ThresholdStrategy::new(0.002);
    let config = config();
    for n in [1_000usize, 10_000, 100_000] {
        let bars = make_bars(n);
        let signals = compute_signals(&LinearTrend::new(24), &bars);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| run_backtest(black_box(&bars), black_box(&signals), &strategy, &config))
        });
    }
    group.finish();
}

// ── 2. Signal precompute ─────────────────────────────────────────────

fn bench_signals(c: &mut Criterion) {
    let bars = make_bars(10_000);
    let mut group = c.benchmark_group("linear_trend");
    for window in [12usize, 48, 168] {
        let provider = LinearTrend::new(window);
        group.bench_with_input(BenchmarkId::from_parameter(window), &window, |b, _| {
            b.iter(|| compute_signals(&provider, black_box(&bars)))
        });
    }
    group.finish();
}

// ── 3. Single step ───────────────────────────────────────────────────

fn bench_step(c: &mut Criterion) {
    let bars = make_bars(2);
    let strategy = ThresholdStrategy::new(0.01);
    let config = config();
    let engine = Engine::new(&strategy, &config);

    c.bench_function("process_bar_flat_hold", |b| {
        b.iter(|| {
            let mut ctx = RunContext::new(&config);
            engine.process_bar(
                &mut ctx,
                &mut SimulatedExecutor,
                0,
                black_box(&bars[0]),
                black_box(bars[0].close),
                true,
            )
        })
    });
}

criterion_group!(benches, bench_backtest, bench_signals, bench_step);
criterion_main!(benches);
