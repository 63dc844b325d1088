//! Backtest runner: wires together config, bar loading, signals, engine, and metrics.
//!
//! Entry points:
//! - `run_single_backtest()`: loads bars for the configured source, then runs. Used by CLI.
//! - `run_backtest_on_bars()`: takes pre-loaded bars, no I/O besides a predictions file.
//! - `run_batch()`: fans independent runs (e.g., one per symbol) out over rayon.

use chrono::{DateTime, TimeZone, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use predtrade_core::data::{BarSource, BinanceKlines, CsvBarSource, DataError, Interval, SyntheticSource};
use predtrade_core::domain::{Bar, TradeRecord};
use predtrade_core::engine::{run_backtest, run_backtest_with_provider, BacktestError, EngineConfig};
use predtrade_core::signal::{LinearTrend, SignalProvider};
use predtrade_core::strategy::Strategy;

use crate::config::{BacktestConfig, ConfigError, DataConfig, SignalConfig};
use crate::metrics::PerformanceSummary;
use crate::signals::{load_predictions, SignalLoadError};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("signal error: {0}")]
    Signals(#[from] SignalLoadError),
    #[error(transparent)]
    Backtest(#[from] BacktestError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub symbol: String,
    pub interval: Interval,
    pub strategy: String,
    /// Forecast source: a provider name, or `predictions`.
    pub signal_source: String,
    pub engine: EngineConfig,
    pub first_bar: Option<DateTime<Utc>>,
    pub last_bar: Option<DateTime<Utc>>,
    pub bar_count: usize,
    pub skipped_signals: usize,
    pub rejected_orders: usize,
    pub summary: PerformanceSummary,
    pub trades: Vec<TradeRecord>,
    /// Engine balance before the first trade and after each one.
    pub balance_history: Vec<f64>,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Fetch the bars a config asks for.
pub fn load_bars(config: &BacktestConfig) -> Result<Vec<Bar>, RunError> {
    let bt = &config.backtest;
    let bars = match &config.data {
        DataConfig::Csv { path } => CsvBarSource::new(path).fetch_bars(
            &bt.symbol,
            bt.interval,
            bt.start.unwrap_or(DateTime::<Utc>::MIN_UTC),
            bt.end,
        )?,
        DataConfig::Binance { market } => {
            let start = bt.start.ok_or_else(|| {
                ConfigError::Invalid("backtest.start is required for the binance source".into())
            })?;
            BinanceKlines::new(*market)?.fetch_bars(&bt.symbol, bt.interval, start, bt.end)?
        }
        DataConfig::Synthetic {
            seed,
            bars,
            start_price,
            volatility,
        } => {
            let source = SyntheticSource {
                seed: *seed,
                start_price: *start_price,
                volatility: *volatility,
                ..SyntheticSource::default()
            };
            let start = bt.start.unwrap_or_else(default_synthetic_start);
            source.generate(start, bt.interval, *bars)?
        }
    };
    tracing::info!(symbol = %bt.symbol, bars = bars.len(), "loaded bars");
    Ok(bars)
}

fn default_synthetic_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Run a single backtest from a config (loads bars from its source).
pub fn run_single_backtest(config: &BacktestConfig) -> Result<BacktestReport, RunError> {
    config.validate()?;
    let bars = load_bars(config)?;
    run_backtest_on_bars(config, &bars)
}

/// Run a backtest on pre-loaded bars.
pub fn run_backtest_on_bars(
    config: &BacktestConfig,
    bars: &[Bar],
) -> Result<BacktestReport, RunError> {
    config.validate()?;
    let strategy = config.strategy();
    let engine = config.engine_config();

    let (result, signal_source) = match &config.signal {
        SignalConfig::LinearTrend { window_size } => {
            let provider = LinearTrend::new(*window_size);
            let result = run_backtest_with_provider(bars, &provider, &strategy, &engine)?;
            (result, provider.name().to_string())
        }
        SignalConfig::Predictions { path, .. } => {
            let signals = load_predictions(path, bars)?;
            (run_backtest(bars, &signals, &strategy, &engine)?, "predictions".to_string())
        }
    };

    let summary = PerformanceSummary::compute(&result.trades, &config.summary_options());
    let balance_history = std::iter::once(engine.initial_balance)
        .chain(result.trades.iter().map(|t| t.balance_after))
        .collect();

    tracing::info!(
        symbol = %config.backtest.symbol,
        trades = summary.trade_count,
        win_rate = %summary.win_rate,
        final_balance = result.final_balance,
        "backtest complete"
    );

    Ok(BacktestReport {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id(),
        symbol: config.backtest.symbol.clone(),
        interval: config.backtest.interval,
        strategy: strategy.name().to_string(),
        signal_source,
        engine,
        first_bar: bars.first().map(|b| b.timestamp),
        last_bar: bars.last().map(|b| b.timestamp),
        bar_count: result.bar_count,
        skipped_signals: result.skipped_signals,
        rejected_orders: result.rejected_orders,
        summary,
        trades: result.trades,
        balance_history,
    })
}

/// Run independent backtests in parallel. Results keep the input order.
pub fn run_batch(configs: &[BacktestConfig]) -> Vec<Result<BacktestReport, RunError>> {
    configs.par_iter().map(run_single_backtest).collect()
}
