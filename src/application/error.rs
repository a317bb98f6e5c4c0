use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{AmountError, FoldError, WalletId};
use crate::storage::is_lock_timeout;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Wallet not found: {}", .0.join(", "))]
    WalletNotFound(Vec<String>),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance in wallet {wallet_id}: balance {balance}, required {required}")]
    InsufficientBalance {
        wallet_id: WalletId,
        balance: Decimal,
        required: Decimal,
    },

    #[error("Cannot transfer from wallet {0} to itself")]
    SameWalletTransfer(WalletId),

    #[error("Invalid report year: {0}")]
    InvalidYear(i32),

    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    #[error("Operation aborted: {0:#}")]
    Aborted(anyhow::Error),
}

impl LedgerError {
    pub fn not_found(ids: impl IntoIterator<Item = WalletId>) -> Self {
        LedgerError::WalletNotFound(ids.into_iter().map(|id| id.to_string()).collect())
    }
}

impl From<AmountError> for LedgerError {
    fn from(err: AmountError) -> Self {
        LedgerError::InvalidAmount(err.to_string())
    }
}

impl From<FoldError> for LedgerError {
    fn from(err: FoldError) -> Self {
        match err {
            FoldError::YearOutOfRange(year) => LedgerError::InvalidYear(year),
            FoldError::Overflow => LedgerError::Aborted(anyhow::Error::new(err)),
        }
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        if is_lock_timeout(&err) {
            LedgerError::LockTimeout(format!("{:#}", err))
        } else {
            LedgerError::Aborted(err)
        }
    }
}

/// Resolve a caller-supplied wallet id. Anything that is not a wallet id
/// cannot name a wallet, so it is reported as not found.
pub fn parse_wallet_id(raw: &str) -> Result<WalletId, LedgerError> {
    Uuid::parse_str(raw.trim()).map_err(|_| LedgerError::WalletNotFound(vec![raw.to_string()]))
}
