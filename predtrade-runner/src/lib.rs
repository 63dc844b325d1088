//! predtrade runner: configuration, orchestration, performance accounting, export.
//!
//! This crate builds on `predtrade-core` to provide:
//! - TOML configuration with environment overrides
//! - Bar loading from CSV, Binance, or a synthetic walk
//! - Precomputed prediction loading aligned to bars
//! - Single and parallel batch backtests
//! - The performance accountant (win rate, P&L ratio, balance curve, drawdown)
//! - JSON, CSV, and Markdown artifacts

pub mod config;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod signals;

pub use config::{BacktestConfig, ConfigError, DataConfig, SignalConfig};
pub use export::{export_json, generate_report, import_json, load_artifacts, save_artifacts};
pub use metrics::{BalanceMode, PerformanceSummary, Stat, SummaryOptions};
pub use runner::{
    load_bars, run_backtest_on_bars, run_batch, run_single_backtest, BacktestReport, RunError,
    SCHEMA_VERSION,
};
pub use signals::{load_predictions, SignalLoadError};
