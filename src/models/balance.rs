//! Per-user, per-asset balances.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Funds a user holds in one asset. `locked` is the portion reserved by
/// that user's open orders; neither side is ever negative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    pub available: Decimal,
    pub locked: Decimal,
}

impl UserBalance {
    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }

    /// Move `amount` from available into locked. The caller must have
    /// checked sufficiency; this only guards the invariant.
    pub fn lock(&mut self, amount: Decimal) -> bool {
        if self.available < amount {
            return false;
        }
        self.available -= amount;
        self.locked += amount;
        true
    }

    /// Return `amount` from locked to available.
    pub fn unlock(&mut self, amount: Decimal) {
        self.locked -= amount;
        self.available += amount;
    }
}
