use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{Amount, Clock, SystemClock, Transaction, Wallet, WalletId};
use crate::storage::{is_unique_violation, LedgerStore, StoreOptions};

use super::{LedgerError, ReportEngine};

/// Fresh ids tried before wallet creation gives up on collisions.
const MAX_ID_ATTEMPTS: usize = 3;

/// Application service providing the ledger's write operations.
/// This is the primary interface for any client (CLI, HTTP API, etc.).
///
/// Every operation runs inside a single commit scope: the wallets it touches
/// are locked in canonical order, re-read, mutated and written back together
/// with their transaction rows, or nothing is written at all.
#[derive(Clone)]
pub struct LedgerService {
    store: LedgerStore,
    clock: Arc<dyn Clock>,
}

/// Result of a committed transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub from_wallet: WalletId,
    pub from_balance: Decimal,
    pub to_wallet: WalletId,
    pub to_balance: Decimal,
    pub amount: Amount,
}

impl LedgerService {
    /// Create a new ledger service over the given store.
    pub fn new(store: LedgerStore) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock that stamps new transactions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, LedgerError> {
        Self::init_with(&StoreOptions::new(format!("sqlite:{}", database_path))).await
    }

    pub async fn init_with(options: &StoreOptions) -> Result<Self, LedgerError> {
        let store = LedgerStore::init(options).await?;
        Ok(Self::new(store))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, LedgerError> {
        Self::connect_with(&StoreOptions::new(format!("sqlite:{}", database_path))).await
    }

    pub async fn connect_with(options: &StoreOptions) -> Result<Self, LedgerError> {
        let store = LedgerStore::connect(options).await?;
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Read-only reporting over the same store.
    pub fn reports(&self) -> ReportEngine {
        ReportEngine::new(self.store.clone())
    }

    // ========================
    // Wallet operations
    // ========================

    /// Create a new wallet with a zero balance.
    pub async fn create_wallet(&self, name: impl Into<String>) -> Result<Wallet, LedgerError> {
        let name = name.into();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let wallet = Wallet::new(name.clone(), self.clock.now());

            let mut scope = self.store.begin().await?;
            let saved = match scope.insert_wallet(&wallet).await {
                Ok(()) => scope.commit().await,
                Err(err) => Err(err),
            };

            match saved {
                Ok(()) => {
                    info!(wallet_id = %wallet.id, name = %wallet.name, "wallet created");
                    return Ok(wallet);
                }
                Err(err) if is_unique_violation(&err) && attempt < MAX_ID_ATTEMPTS => {
                    warn!(wallet_id = %wallet.id, attempt, "wallet id collision, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Get a wallet by ID.
    pub async fn get_wallet(&self, id: WalletId) -> Result<Wallet, LedgerError> {
        let mut snapshot = self.store.snapshot().await?;
        snapshot
            .fetch_wallet(id)
            .await?
            .ok_or_else(|| LedgerError::not_found([id]))
    }

    /// List all wallets.
    pub async fn list_wallets(&self) -> Result<Vec<Wallet>, LedgerError> {
        let mut snapshot = self.store.snapshot().await?;
        Ok(snapshot.list_wallets().await?)
    }

    // ========================
    // Balance operations
    // ========================

    /// Add `amount` to a wallet and record a Deposit. Returns the new balance.
    pub async fn deposit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
    ) -> Result<Decimal, LedgerError> {
        let mut scope = self.store.begin_locked(&[wallet_id]).await?;

        let mut wallet = scope
            .fetch_wallet(wallet_id)
            .await?
            .ok_or_else(|| LedgerError::not_found([wallet_id]))?;

        wallet.balance = wallet
            .credited(amount)
            .ok_or_else(|| balance_overflow(wallet_id, amount))?;
        scope.update_balance(&wallet).await?;

        let mut transaction = Transaction::deposit(wallet_id, amount, self.clock.now());
        scope.append_transaction(&mut transaction).await?;
        scope.commit().await?;

        info!(
            wallet_id = %wallet_id,
            amount = %amount,
            balance = %wallet.balance,
            sequence = transaction.sequence,
            "deposit committed"
        );
        Ok(wallet.balance)
    }

    /// Take `amount` out of a wallet and record a Withdraw. Returns the new balance.
    pub async fn withdraw(
        &self,
        wallet_id: WalletId,
        amount: Amount,
    ) -> Result<Decimal, LedgerError> {
        let mut scope = self.store.begin_locked(&[wallet_id]).await?;

        let mut wallet = scope
            .fetch_wallet(wallet_id)
            .await?
            .ok_or_else(|| LedgerError::not_found([wallet_id]))?;

        let Some(remaining) = wallet.debited(amount) else {
            warn!(
                wallet_id = %wallet_id,
                amount = %amount,
                balance = %wallet.balance,
                "withdraw rejected: insufficient balance"
            );
            return Err(LedgerError::InsufficientBalance {
                wallet_id,
                balance: wallet.balance,
                required: amount.value(),
            });
        };

        wallet.balance = remaining;
        scope.update_balance(&wallet).await?;

        let mut transaction = Transaction::withdraw(wallet_id, amount, self.clock.now());
        scope.append_transaction(&mut transaction).await?;
        scope.commit().await?;

        info!(
            wallet_id = %wallet_id,
            amount = %amount,
            balance = %wallet.balance,
            sequence = transaction.sequence,
            "withdraw committed"
        );
        Ok(wallet.balance)
    }

    /// Move `amount` between two wallets as one atomic unit: a Withdraw leg
    /// on `from` and a Deposit leg on `to`.
    pub async fn transfer(
        &self,
        from: WalletId,
        to: WalletId,
        amount: Amount,
    ) -> Result<TransferResult, LedgerError> {
        if from == to {
            return Err(LedgerError::SameWalletTransfer(from));
        }

        // Both rows, canonical order: opposite-direction transfers queue on the same first lock.
        let mut scope = self.store.begin_locked(&[from, to]).await?;

        let from_wallet = scope.fetch_wallet(from).await?;
        let to_wallet = scope.fetch_wallet(to).await?;

        let (mut from_wallet, mut to_wallet) = match (from_wallet, to_wallet) {
            (Some(f), Some(t)) => (f, t),
            (f, t) => {
                let missing = [(from, f.is_none()), (to, t.is_none())]
                    .into_iter()
                    .filter_map(|(id, absent)| absent.then_some(id));
                return Err(LedgerError::not_found(missing));
            }
        };

        let Some(from_balance) = from_wallet.debited(amount) else {
            warn!(
                from = %from,
                to = %to,
                amount = %amount,
                balance = %from_wallet.balance,
                "transfer rejected: insufficient balance"
            );
            return Err(LedgerError::InsufficientBalance {
                wallet_id: from,
                balance: from_wallet.balance,
                required: amount.value(),
            });
        };
        let to_balance = to_wallet
            .credited(amount)
            .ok_or_else(|| balance_overflow(to, amount))?;

        from_wallet.balance = from_balance;
        to_wallet.balance = to_balance;
        scope.update_balance(&from_wallet).await?;
        scope.update_balance(&to_wallet).await?;

        let now = self.clock.now();
        let mut withdraw_leg = Transaction::withdraw(from, amount, now);
        let mut deposit_leg = Transaction::deposit(to, amount, now);
        scope.append_transaction(&mut withdraw_leg).await?;
        scope.append_transaction(&mut deposit_leg).await?;
        scope.commit().await?;

        info!(
            from = %from,
            to = %to,
            amount = %amount,
            from_balance = %from_wallet.balance,
            to_balance = %to_wallet.balance,
            "transfer committed"
        );

        Ok(TransferResult {
            from_wallet: from,
            from_balance: from_wallet.balance,
            to_wallet: to,
            to_balance: to_wallet.balance,
            amount,
        })
    }
}

fn balance_overflow(wallet_id: WalletId, amount: Amount) -> LedgerError {
    warn!(wallet_id = %wallet_id, amount = %amount, "credit rejected: balance would overflow");
    LedgerError::InvalidAmount(format!(
        "adding {} would overflow the balance of wallet {}",
        amount, wallet_id
    ))
}
