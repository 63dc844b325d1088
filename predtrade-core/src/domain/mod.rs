//! Domain types for predtrade

pub mod account;
pub mod bar;
pub mod position;
pub mod side;
pub mod trade;

pub use account::Account;
pub use bar::{first_unordered, Bar};
pub use position::Position;
pub use side::{ParseSideError, Side};
pub use trade::{ExitReason, TradeRecord};
