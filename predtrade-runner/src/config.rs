//! Serializable backtest configuration.
//!
//! A run is described by a TOML file with five sections:
//!
//! ```toml
//! [backtest]
//! symbol = "BTC/USDT:USDT"
//! interval = "1h"
//! initial_balance = 10000.0
//! start = "2024-01-01T00:00:00Z"
//!
//! [trading]
//! leverage = 3.0
//! stop_loss = 0.02
//! threshold = 0.005
//!
//! [data]
//! source = "binance"
//! market = "usd_m"
//!
//! [signal]
//! provider = "linear_trend"
//! window_size = 24
//!
//! [report]
//! output_dir = "reports"
//! ```
//!
//! Trading parameters can be overridden from the environment (`LEVERAGE`,
//! `STOP_LOSS`, `THRESHOLD`, `WINDOW_SIZE`, `MIN_ORDER_AMOUNT`, `FEE_RATE`).
//! Environment values win over file values.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use predtrade_core::data::{BinanceMarket, Interval};
use predtrade_core::engine::EngineConfig;
use predtrade_core::ledger::GapPolicy;
use predtrade_core::signal::SignalKind;
use predtrade_core::strategy::{ThresholdStrategy, TradingMode};

use crate::metrics::{BalanceMode, SummaryOptions};

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

/// Errors from loading or validating a config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable {name}={value:?} is not a valid number")]
    Env { name: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level config for one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub backtest: BacktestSection,
    #[serde(default)]
    pub trading: TradingSection,
    pub data: DataConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub report: ReportSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSection {
    pub symbol: String,
    #[serde(default = "default_interval")]
    pub interval: Interval,
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,
    #[serde(default)]
    pub balance_mode: BalanceMode,
    /// Leave the end-of-data close out of the summary statistics.
    #[serde(default)]
    pub exclude_forced_closes: bool,
    /// Inclusive start of the bar range (RFC 3339 string).
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// Exclusive end of the bar range (RFC 3339 string). Defaults to now.
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

/// Strategy and order parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingSection {
    pub leverage: f64,
    pub stop_loss: f64,
    /// Minimum |expected return| needed to open.
    pub threshold: f64,
    /// Directional expected return below which an open position is closed.
    pub exit_threshold: f64,
    pub min_order_amount: f64,
    pub amount_step: f64,
    pub fee_rate: f64,
    pub trading_mode: TradingMode,
    pub gap_policy: GapPolicy,
}

impl Default for TradingSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            leverage: engine.leverage,
            stop_loss: engine.stop_loss,
            threshold: 0.005,
            exit_threshold: 0.0,
            min_order_amount: engine.min_order_amount,
            amount_step: engine.amount_step,
            fee_rate: engine.fee_rate,
            trading_mode: engine.trading_mode,
            gap_policy: engine.gap_policy,
        }
    }
}

/// Where bars come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DataConfig {
    /// A local CSV file with `timestamp,open,high,low,close[,volume]`.
    Csv { path: PathBuf },
    /// Public Binance klines.
    Binance {
        #[serde(default)]
        market: BinanceMarket,
    },
    /// Seeded random walk of `bars` bars starting at `[backtest].start`.
    Synthetic {
        #[serde(default = "default_seed")]
        seed: u64,
        #[serde(default = "default_synthetic_bars")]
        bars: usize,
        #[serde(default = "default_start_price")]
        start_price: f64,
        #[serde(default = "default_volatility")]
        volatility: f64,
    },
}

/// Where forecasts come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum SignalConfig {
    /// Least-squares extrapolation over the trailing window.
    LinearTrend {
        #[serde(default = "default_window_size")]
        window_size: usize,
    },
    /// Precomputed model output, a CSV of `timestamp,prediction`.
    Predictions {
        path: PathBuf,
        #[serde(default)]
        kind: SignalKind,
    },
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig::LinearTrend {
            window_size: default_window_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_interval() -> Interval {
    Interval::H1
}
fn default_initial_balance() -> f64 {
    EngineConfig::default().initial_balance
}
fn default_seed() -> u64 {
    42
}
fn default_synthetic_bars() -> usize {
    1_000
}
fn default_start_price() -> f64 {
    100.0
}
fn default_volatility() -> f64 {
    0.02
}
fn default_window_size() -> usize {
    24
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

/// Upper bound on `data.bars` for the synthetic source.
pub const MAX_SYNTHETIC_BARS: usize = 10_000_000;
/// Upper bound on the linear-trend window.
pub const MAX_WINDOW_SIZE: usize = 100_000;

impl BacktestConfig {
    /// Parse a config from a TOML string. Does not validate.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read, apply process environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override trading parameters from variables returned by `lookup`.
    ///
    /// `lookup` is injected so tests do not touch the process environment.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let number = |name: &str| -> Result<Option<f64>, ConfigError> {
            match lookup(name) {
                None => Ok(None),
                Some(raw) => raw.trim().parse::<f64>().map(Some).map_err(|_| ConfigError::Env {
                    name: name.to_string(),
                    value: raw,
                }),
            }
        };

        if let Some(v) = number("LEVERAGE")? {
            self.trading.leverage = v;
        }
        if let Some(v) = number("STOP_LOSS")? {
            self.trading.stop_loss = v;
        }
        if let Some(v) = number("THRESHOLD")? {
            self.trading.threshold = v;
        }
        if let Some(v) = number("MIN_ORDER_AMOUNT")? {
            self.trading.min_order_amount = v;
        }
        if let Some(v) = number("FEE_RATE")? {
            self.trading.fee_rate = v;
        }
        if let Some(raw) = lookup("WINDOW_SIZE") {
            let size = raw.trim().parse::<usize>().map_err(|_| ConfigError::Env {
                name: "WINDOW_SIZE".to_string(),
                value: raw.clone(),
            })?;
            match &mut self.signal {
                SignalConfig::LinearTrend { window_size } => *window_size = size,
                SignalConfig::Predictions { .. } => {
                    tracing::warn!("WINDOW_SIZE ignored: signals come from a predictions file");
                }
            }
        }
        Ok(())
    }

    /// Check everything the engine and loaders would otherwise reject mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backtest.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("backtest.symbol must not be empty".into()));
        }
        self.engine_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let t = &self.trading;
        if !(t.threshold.is_finite() && t.threshold >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "trading.threshold must be >= 0, got {}",
                t.threshold
            )));
        }
        if !t.exit_threshold.is_finite() {
            return Err(ConfigError::Invalid("trading.exit_threshold must be finite".into()));
        }
        if let (Some(start), Some(end)) = (self.backtest.start, self.backtest.end) {
            if start >= end {
                return Err(ConfigError::Invalid(format!(
                    "backtest.start {start} must be before backtest.end {end}"
                )));
            }
        }
        match &self.data {
            DataConfig::Binance { .. } if self.backtest.start.is_none() => {
                return Err(ConfigError::Invalid(
                    "backtest.start is required for the binance source".into(),
                ));
            }
            DataConfig::Synthetic { bars, .. } if *bars == 0 || *bars > MAX_SYNTHETIC_BARS => {
                return Err(ConfigError::Invalid(format!(
                    "data.bars must be in 1..={MAX_SYNTHETIC_BARS}, got {bars}"
                )));
            }
            _ => {}
        }
        if let SignalConfig::LinearTrend { window_size } = self.signal {
            if !(2..=MAX_WINDOW_SIZE).contains(&window_size) {
                return Err(ConfigError::Invalid(format!(
                    "signal.window_size must be in 2..={MAX_WINDOW_SIZE}, got {window_size}"
                )));
            }
        }
        Ok(())
    }

    /// Engine parameters for this run.
    pub fn engine_config(&self) -> EngineConfig {
        let t = &self.trading;
        EngineConfig {
            initial_balance: self.backtest.initial_balance,
            leverage: t.leverage,
            stop_loss: t.stop_loss,
            min_order_amount: t.min_order_amount,
            amount_step: t.amount_step,
            fee_rate: t.fee_rate,
            trading_mode: t.trading_mode,
            gap_policy: t.gap_policy,
            signal_kind: match &self.signal {
                SignalConfig::LinearTrend { .. } => SignalKind::PredictedPrice,
                SignalConfig::Predictions { kind, .. } => *kind,
            },
        }
    }

    /// The threshold strategy described by `[trading]`. Call after `validate`.
    pub fn strategy(&self) -> ThresholdStrategy {
        ThresholdStrategy::new(self.trading.threshold)
            .with_exit_threshold(self.trading.exit_threshold)
    }

    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            initial_balance: self.backtest.initial_balance,
            balance_mode: self.backtest.balance_mode,
            exclude_forced_closes: self.backtest.exclude_forced_closes,
        }
    }

    /// A copy of this config trading `symbol` instead.
    pub fn for_symbol(&self, symbol: &str) -> Self {
        let mut config = self.clone();
        config.backtest.symbol = symbol.to_string();
        config
    }

    /// Computes a deterministic hash ID for this configuration.
    ///
    /// Two runs with identical configs have the same RunId.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).expect("BacktestConfig serialization failed");
        let hash = blake3::hash(json.as_bytes());
        format!("{}", hash.to_hex())
    }
}
