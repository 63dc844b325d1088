//! Bar sources: exchange klines, CSV files, synthetic series.

pub mod binance;
pub mod csv_source;
pub mod interval;
pub mod provider;
pub mod synthetic;

pub use binance::{normalize_symbol, BinanceKlines, BinanceMarket};
pub use csv_source::{read_bars_csv, write_bars_csv, CsvBarSource};
pub use interval::Interval;
pub use provider::{fetch_recent, validate_order, BarSource, DataError};
pub use synthetic::SyntheticSource;
