//! Backtest loop: drives the bar state machine over a full series.
//!
//! 1. Validate config, input lengths and bar ordering
//! 2. Run [`Engine::process_bar`] for every bar, never opening on the last
//!    non-void one or after it
//! 3. Force-close anything still open at that bar's close (`EndOfData`)
//! 4. Return the [`RunResult`]
//!
//! Any engine error aborts the run; the [`BacktestError`] carries the bar
//! index and every trade closed before the failure.

use tracing::info;

use super::state::{EngineConfig, RunContext, RunResult};
use super::step::Engine;
use super::{BacktestError, EngineError};
use crate::domain::{first_unordered, Bar};
use crate::exchange::SimulatedExecutor;
use crate::signal::{compute_signals, SignalProvider};
use crate::strategy::Strategy;

/// Run a backtest over `bars` with one precomputed forecast per bar.
///
/// Forecasts are read according to `config.signal_kind`; NaN means "no
/// forecast" and holds.
pub fn run_backtest(
    bars: &[Bar],
    signals: &[f64],
    strategy: &dyn Strategy,
    config: &EngineConfig,
) -> Result<RunResult, BacktestError> {
    let reject = |source: EngineError| BacktestError {
        bar_index: None,
        source,
        trades: Vec::new(),
    };
    config.validate().map_err(reject)?;
    if signals.len() != bars.len() {
        return Err(reject(EngineError::InputMismatch {
            bars: bars.len(),
            signals: signals.len(),
        }));
    }
    if let Some(index) = first_unordered(bars) {
        return Err(BacktestError {
            bar_index: Some(index),
            source: EngineError::UnorderedBars { index },
            trades: Vec::new(),
        });
    }

    info!(
        bars = bars.len(),
        strategy = strategy.name(),
        leverage = config.leverage,
        stop_loss = config.stop_loss,
        "starting backtest"
    );

    let engine = Engine::new(strategy, config);
    let mut executor = SimulatedExecutor;
    let mut ctx = RunContext::new(config);
    let last_valid = bars.iter().rposition(|b| !b.is_void());

    for (t, (bar, &forecast)) in bars.iter().zip(signals).enumerate() {
        let allow_open = last_valid.is_some_and(|last| t < last);
        if let Err(source) = engine.process_bar(&mut ctx, &mut executor, t, bar, forecast, allow_open) {
            return Err(BacktestError {
                bar_index: Some(t),
                source,
                trades: ctx.trades,
            });
        }
    }

    if let Some(t) = last_valid {
        let bar = &bars[t];
        if let Err(source) = engine.force_close(&mut ctx, &mut executor, t, bar) {
            return Err(BacktestError {
                bar_index: Some(t),
                source,
                trades: ctx.trades,
            });
        }
    }

    let result = ctx.into_result();
    info!(
        trades = result.trades.len(),
        final_balance = result.final_balance,
        skipped_signals = result.skipped_signals,
        rejected_orders = result.rejected_orders,
        "backtest complete"
    );
    Ok(result)
}

/// Run a provider over the series, then backtest on its forecasts.
///
/// The provider's own [`SignalKind`](crate::signal::SignalKind) overrides
/// `config.signal_kind`.
pub fn run_backtest_with_provider(
    bars: &[Bar],
    provider: &dyn SignalProvider,
    strategy: &dyn Strategy,
    config: &EngineConfig,
) -> Result<RunResult, BacktestError> {
    let signals = compute_signals(provider, bars);
    let config = EngineConfig {
        signal_kind: provider.kind(),
        ..config.clone()
    };
    run_backtest(bars, &signals, strategy, &config)
}
