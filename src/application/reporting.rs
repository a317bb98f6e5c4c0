use anyhow::Context;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    derived_balance, monthly_rollup, normalize, totals, MonthBucket, Transaction, Wallet, WalletId,
};
use crate::storage::{LedgerStore, Snapshot};

use super::LedgerError;

/// Stored balance next to the balance folded from the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceReconciliation {
    pub wallet_id: WalletId,
    pub name: String,
    pub stored_balance: Decimal,
    pub derived_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl BalanceReconciliation {
    pub fn is_consistent(&self) -> bool {
        self.stored_balance == self.derived_balance && self.stored_balance >= Decimal::ZERO
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransactions {
    pub wallet_id: WalletId,
    pub derived_balance: Decimal,
    pub stored_balance: Decimal,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSummary {
    pub wallet_id: WalletId,
    pub current_balance: Decimal,
    pub total_added: Decimal,
    pub total_spent: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyReport {
    pub wallet_id: WalletId,
    pub year: i32,
    pub monthly_report: Vec<MonthBucket>,
}

/// Read-only queries derived from the transaction log.
///
/// Each query runs inside one snapshot, so a wallet's stored balance and its
/// transactions always come from the same committed state. Reports never
/// take wallet locks.
#[derive(Clone)]
pub struct ReportEngine {
    store: LedgerStore,
}

impl ReportEngine {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    async fn load(&self, wallet_id: WalletId) -> Result<(Wallet, Vec<Transaction>), LedgerError> {
        let mut snapshot: Snapshot = self.store.snapshot().await?;
        let wallet = snapshot
            .fetch_wallet(wallet_id)
            .await?
            .ok_or_else(|| LedgerError::not_found([wallet_id]))?;
        let transactions = snapshot.list_transactions(wallet_id).await?;
        Ok((wallet, transactions))
    }

    /// Balance folded from the full history, next to the stored balance.
    pub async fn derived_balance(
        &self,
        wallet_id: WalletId,
    ) -> Result<BalanceReconciliation, LedgerError> {
        let (wallet, transactions) = self.load(wallet_id).await?;
        Ok(BalanceReconciliation {
            wallet_id,
            name: wallet.name,
            stored_balance: wallet.balance,
            derived_balance: derived_balance(&transactions)?,
            created_at: wallet.created_at,
        })
    }

    /// The wallet's log in creation order, with both balances.
    pub async fn wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<WalletTransactions, LedgerError> {
        let (wallet, transactions) = self.load(wallet_id).await?;
        Ok(WalletTransactions {
            wallet_id,
            derived_balance: derived_balance(&transactions)?,
            stored_balance: wallet.balance,
            transactions,
        })
    }

    /// Current balance and all-time deposit/withdraw totals.
    pub async fn summary(&self, wallet_id: WalletId) -> Result<WalletSummary, LedgerError> {
        let (wallet, transactions) = self.load(wallet_id).await?;
        let totals = totals(&transactions)?;
        Ok(WalletSummary {
            wallet_id,
            current_balance: wallet.balance,
            total_added: normalize(totals.added),
            total_spent: normalize(totals.spent),
        })
    }

    /// Twelve month buckets for `year`, each opening where the previous closed.
    pub async fn monthly_report(
        &self,
        wallet_id: WalletId,
        year: i32,
    ) -> Result<MonthlyReport, LedgerError> {
        let (_, transactions) = self.load(wallet_id).await?;
        let monthly_report = monthly_rollup(year, &transactions)?;
        Ok(MonthlyReport {
            wallet_id,
            year,
            monthly_report,
        })
    }

    /// Reconcile every wallet against the log in one snapshot.
    pub async fn reconcile_all(&self) -> Result<Vec<BalanceReconciliation>, LedgerError> {
        let mut snapshot = self.store.snapshot().await?;
        let wallets = snapshot.list_wallets().await?;
        let transactions = snapshot.list_all_transactions().await?;

        wallets
            .into_iter()
            .map(|wallet| -> Result<BalanceReconciliation, LedgerError> {
                let own = transactions.iter().filter(|tx| tx.wallet_id == wallet.id);
                let totals = totals(own)
                    .with_context(|| format!("Failed to fold the log of wallet {}", wallet.id))?;
                Ok(BalanceReconciliation {
                    wallet_id: wallet.id,
                    name: wallet.name,
                    stored_balance: wallet.balance,
                    derived_balance: normalize(totals.net()),
                    created_at: wallet.created_at,
                })
            })
            .collect()
    }
}
