//! predtrade core: position state machine, backtest engine, and its seams.
//!
//! This crate contains the heart of the trading engine:
//! - Domain types (bars, sides, positions, trade records, account)
//! - Single-position ledger with leveraged PnL and stop-loss checks
//! - Strategy trait and the default threshold strategy
//! - Signal provider trait (model inference seam)
//! - Order executor trait (exchange seam) with simulated and paper executors
//! - Bar sources (Binance klines, CSV, synthetic)
//! - Per-bar engine shared by the backtest loop and the live tick

pub mod data;
pub mod domain;
pub mod engine;
pub mod exchange;
pub mod ledger;
pub mod live;
pub mod signal;
pub mod strategy;
