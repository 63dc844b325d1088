//! Position: the single leveraged exposure held by a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::side::Side;

/// An open leveraged position.
///
/// There is no "flat" variant: a flat ledger simply holds no `Position`, so
/// entry and stop data can never be read while flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    /// Base asset units.
    pub size: f64,
    pub leverage: f64,
    /// `None` when the stop is disabled (stop rate of zero).
    pub stop_loss_price: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub entry_bar: usize,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    pub fn is_short(&self) -> bool {
        self.side == Side::Short
    }

    /// Notional value at entry (size * entry price).
    pub fn notional(&self) -> f64 {
        self.size * self.entry_price
    }

    /// Collateral backing the position (notional / leverage).
    pub fn margin(&self) -> f64 {
        self.notional() / self.leverage
    }

    /// Leveraged simple return if the position were closed at `price`, before fees.
    pub fn return_rate_at(&self, price: f64) -> f64 {
        (price - self.entry_price) / self.entry_price * self.leverage * self.side.sign()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn position(side: Side, leverage: f64) -> Position {
        Position {
            side,
            entry_price: 100.0,
            size: 2.0,
            leverage,
            stop_loss_price: None,
            opened_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            entry_bar: 0,
        }
    }

    #[test]
    fn long_gains_when_price_rises() {
        let pos = position(Side::Long, 1.0);
        assert!((pos.return_rate_at(110.0) - 0.10).abs() < 1e-12);
        assert!(pos.is_long());
    }

    #[test]
    fn short_loses_when_price_rises() {
        let pos = position(Side::Short, 1.0);
        assert!((pos.return_rate_at(110.0) + 0.10).abs() < 1e-12);
        assert!(pos.is_short());
    }

    #[test]
    fn margin_scales_inversely_with_leverage() {
        assert_eq!(position(Side::Long, 1.0).margin(), 200.0);
        assert_eq!(position(Side::Long, 4.0).margin(), 50.0);
    }
}
