//! Live tick: one scheduled invocation processes exactly one closed bar.
//!
//! Each tick fetches the rolling window ending now, predicts on it, and runs
//! the same [`Engine::process_bar`] the backtest uses on the newest bar. The
//! [`RunContext`] is persisted between ticks as JSON. A bar that was already
//! processed by an earlier tick is reported and not traded again. Bars that
//! closed between the previous tick and the newest one are stop-checked in
//! order before the newest bar is handled.
//!
//! Any data or execution failure is returned to the caller with the context
//! exactly as it was before the tick. There is no retry here; the scheduler's
//! next invocation is the retry.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::data::{fetch_recent, validate_order, BarSource, DataError, Interval};
use crate::domain::TradeRecord;
use crate::engine::{BarOutcome, Engine, EngineConfig, EngineError, RunContext};
use crate::exchange::OrderExecutor;
use crate::signal::SignalProvider;
use crate::strategy::Strategy;

#[derive(Debug, Error)]
pub enum LiveError {
    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("insufficient data: need {needed} bars, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("state file {path}: {message}")]
    State { path: String, message: String },
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    /// The newest closed bar was handled by an earlier tick.
    AlreadyProcessed { bar_time: DateTime<Utc> },
    Processed {
        bar_time: DateTime<Utc>,
        close: f64,
        forecast: f64,
        /// Stop-loss exit on a bar between the previous tick and this one.
        missed_stop: Option<TradeRecord>,
        outcome: BarOutcome,
    },
}

/// Everything a live tick needs besides the mutable context and the executor.
pub struct LiveTrader<'a> {
    pub source: &'a dyn BarSource,
    pub provider: &'a dyn SignalProvider,
    pub strategy: &'a dyn Strategy,
    pub config: &'a EngineConfig,
    pub symbol: &'a str,
    pub interval: Interval,
}

impl LiveTrader<'_> {
    pub fn tick(
        &self,
        ctx: &mut RunContext,
        executor: &mut dyn OrderExecutor,
        now: DateTime<Utc>,
    ) -> Result<TickReport, LiveError> {
        let window = self.provider.window_size().max(1);
        let bars = fetch_recent(self.source, self.symbol, self.interval, window, now)?;
        validate_order(&bars)?;
        let latest = match bars.last() {
            Some(bar) if bars.len() >= window => bar,
            _ => {
                return Err(LiveError::InsufficientData {
                    needed: window,
                    got: bars.len(),
                })
            }
        };

        if ctx.last_bar_time.is_some_and(|t| t >= latest.timestamp) {
            info!(symbol = self.symbol, bar_time = %latest.timestamp, "bar already processed");
            return Ok(TickReport::AlreadyProcessed {
                bar_time: latest.timestamp,
            });
        }

        let forecast = self.provider.predict(&bars);
        let config = EngineConfig {
            signal_kind: self.provider.kind(),
            ..self.config.clone()
        };
        let engine = Engine::new(self.strategy, &config);
        let mut next = ctx.clone();

        // Bars missed since the last tick still get their stop checked.
        let mut missed_stop = None;
        if let Some(last_time) = ctx.last_bar_time {
            let missed = bars[..bars.len() - 1]
                .iter()
                .filter(|b| b.timestamp > last_time);
            for bar in missed {
                let bar_index = next.bars_processed;
                if let Some(trade) = engine.stop_check_only(&mut next, executor, bar_index, bar)? {
                    warn!(
                        symbol = self.symbol,
                        bar_time = %bar.timestamp,
                        exit = trade.exit_price,
                        "stop hit on a missed bar"
                    );
                    missed_stop = Some(trade);
                }
            }
        }

        let bar_index = next.bars_processed;
        info!(
            symbol = self.symbol,
            bar_time = %latest.timestamp,
            close = latest.close,
            forecast,
            "live tick"
        );
        let outcome = engine.process_bar(&mut next, executor, bar_index, latest, forecast, true)?;
        *ctx = next;

        Ok(TickReport::Processed {
            bar_time: latest.timestamp,
            close: latest.close,
            forecast,
            missed_stop,
            outcome,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct StateFile {
    symbol: String,
    context: RunContext,
}

/// Load the persisted context for `symbol`, or start fresh if there is none.
pub fn load_context(path: &Path, symbol: &str, config: &EngineConfig) -> Result<RunContext, LiveError> {
    let state_err = |message: String| LiveError::State {
        path: path.display().to_string(),
        message,
    };
    if !path.exists() {
        return Ok(RunContext::new(config));
    }
    let text = std::fs::read_to_string(path).map_err(|e| state_err(e.to_string()))?;
    let state: StateFile = serde_json::from_str(&text).map_err(|e| state_err(e.to_string()))?;
    if state.symbol != symbol {
        return Err(state_err(format!(
            "belongs to {}, not {symbol}",
            state.symbol
        )));
    }
    Ok(state.context)
}

/// Persist the context atomically (write to a sibling temp file, then rename).
pub fn save_context(path: &Path, symbol: &str, ctx: &RunContext) -> Result<(), LiveError> {
    let state_err = |message: String| LiveError::State {
        path: path.display().to_string(),
        message,
    };
    let state = StateFile {
        symbol: symbol.to_string(),
        context: ctx.clone(),
    };
    let json = serde_json::to_string_pretty(&state).map_err(|e| state_err(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| state_err(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| state_err(e.to_string()))?;
    Ok(())
}
