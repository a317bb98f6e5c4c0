use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, WalletId};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Deposit,
    Withdraw,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(TransactionKind::Deposit),
            "withdraw" => Some(TransactionKind::Withdraw),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Deposit => write!(f, "Deposit"),
            TransactionKind::Withdraw => write!(f, "Withdraw"),
        }
    }
}

/// One entry of a wallet's transaction log.
/// Transactions are immutable once committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Monotonically increasing sequence number, assigned by the store
    pub sequence: i64,
    pub wallet_id: WalletId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Always positive
    pub value: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction. Sequence number must be assigned by the store.
    pub fn new(
        wallet_id: WalletId,
        kind: TransactionKind,
        amount: Amount,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            wallet_id,
            kind,
            value: amount.value(),
            created_at,
        }
    }

    pub fn deposit(wallet_id: WalletId, amount: Amount, created_at: DateTime<Utc>) -> Self {
        Self::new(wallet_id, TransactionKind::Deposit, amount, created_at)
    }

    pub fn withdraw(wallet_id: WalletId, amount: Amount, created_at: DateTime<Utc>) -> Self {
        Self::new(wallet_id, TransactionKind::Withdraw, amount, created_at)
    }

    /// The effect of this transaction on its wallet's balance.
    pub fn signed_value(&self) -> Decimal {
        match self.kind {
            TransactionKind::Deposit => self.value,
            TransactionKind::Withdraw => -self.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [TransactionKind::Deposit, TransactionKind::Withdraw] {
            assert_eq!(TransactionKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(TransactionKind::from_str("transfer"), None);
    }

    #[test]
    fn test_signed_value() {
        let wallet = Uuid::new_v4();
        let deposit = Transaction::deposit(wallet, amount("40"), Utc::now());
        let withdraw = Transaction::withdraw(wallet, amount("15.5"), Utc::now());

        assert_eq!(deposit.signed_value(), Decimal::from(40));
        assert_eq!(withdraw.signed_value(), Decimal::new(-155, 1));
    }

    #[test]
    fn test_serializes_kind_as_type_tag() {
        let tx = Transaction::deposit(Uuid::new_v4(), amount("100"), Utc::now());
        let json = serde_json::to_value(&tx).unwrap();

        assert_eq!(json["type"], "Deposit");
        assert_eq!(json["value"], "100.00");
    }
}
