use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{zero, Amount};

pub type WalletId = Uuid;

/// A wallet record as stored in the ledger.
///
/// This is plain data: the ledger service loads it inside a commit scope,
/// adjusts `balance` and writes it back. A wallet never persists itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub name: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            balance: zero(),
            created_at,
        }
    }

    pub fn can_cover(&self, amount: Amount) -> bool {
        self.balance >= amount.value()
    }

    /// Balance after adding `amount`, or `None` past `Decimal::MAX`.
    pub fn credited(&self, amount: Amount) -> Option<Decimal> {
        self.balance.checked_add(amount.value())
    }

    /// Balance after taking out `amount`, or `None` if the wallet cannot cover it.
    pub fn debited(&self, amount: Amount) -> Option<Decimal> {
        if !self.can_cover(amount) {
            return None;
        }
        self.balance.checked_sub(amount.value())
    }
}

/// Sort and de-duplicate wallet ids into the canonical lock order.
///
/// UUIDs order by their bytes, which matches ascending order of their
/// lowercase hyphenated string form.
pub fn canonical_order(ids: &[WalletId]) -> Vec<WalletId> {
    let mut ordered = ids.to_vec();
    ordered.sort();
    ordered.dedup();
    ordered
}
