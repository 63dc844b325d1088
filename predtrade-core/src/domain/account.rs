use serde::{Deserialize, Serialize};

/// Realized account state of a run. Mutated only when a trade closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub initial_balance: f64,
    pub balance: f64,
    pub peak_balance: f64,
}

impl Account {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            initial_balance,
            balance: initial_balance,
            peak_balance: initial_balance,
        }
    }

    /// Book realized PnL and return the new balance.
    pub fn realize(&mut self, pnl_amount: f64) -> f64 {
        self.balance += pnl_amount;
        if self.balance > self.peak_balance {
            self.peak_balance = self.balance;
        }
        self.balance
    }

    /// Current drawdown from the realized peak, as a non-positive fraction.
    pub fn drawdown(&self) -> f64 {
        if self.peak_balance <= 0.0 {
            return 0.0;
        }
        (self.balance - self.peak_balance) / self.peak_balance
    }

    pub fn total_return(&self) -> f64 {
        if self.initial_balance <= 0.0 {
            return 0.0;
        }
        (self.balance - self.initial_balance) / self.initial_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_tracks_high_water_mark() {
        let mut account = Account::new(1_000.0);
        account.realize(100.0);
        account.realize(-220.0);
        assert_eq!(account.balance, 880.0);
        assert_eq!(account.peak_balance, 1_100.0);
        assert!((account.drawdown() + 0.2).abs() < 1e-12);
        assert!((account.total_return() + 0.12).abs() < 1e-12);
    }
}
