use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionKind, Wallet, WalletId};

use super::{LockTimeout, RowGuard, RowLocks, MIGRATION_001_INITIAL};

/// SQLite result codes that mean another connection holds the database.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Connection settings for the ledger store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub database_url: String,
    /// Upper bound on waiting for row locks and for the SQLite write lock.
    pub lock_timeout: Duration,
    pub max_connections: u32,
}

impl StoreOptions {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            lock_timeout: Duration::from_secs(5),
            max_connections: 8,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}

/// Durable storage for wallets and their append-only transaction log.
///
/// Writes happen only through a [`CommitScope`]; reads for reporting go
/// through a [`Snapshot`]. Cloning is cheap and clones share the pool and
/// the row-lock table.
#[derive(Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
    locks: Arc<RowLocks>,
    lock_timeout: Duration,
}

impl LedgerStore {
    /// Create a new store with the given SQLite connection pool.
    pub fn new(pool: SqlitePool, lock_timeout: Duration) -> Self {
        Self {
            pool,
            locks: Arc::new(RowLocks::new()),
            lock_timeout,
        }
    }

    async fn open(options: &StoreOptions, create_if_missing: bool) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(&options.database_url)
            .context("Invalid database URL")?
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.lock_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .connect_with(connect_options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::new(pool, options.lock_timeout))
    }

    /// Connect to an existing database.
    pub async fn connect(options: &StoreOptions) -> Result<Self> {
        Self::open(options, false).await
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database, creating the file if needed (connect + migrate).
    pub async fn init(options: &StoreOptions) -> Result<Self> {
        let store = Self::open(options, true).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a commit scope that holds no wallet rows.
    /// Only wallet creation can happen in such a scope.
    pub async fn begin(&self) -> Result<CommitScope> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(CommitScope { tx, rows: None })
    }

    /// Begin a commit scope holding exclusive access to every listed wallet.
    ///
    /// Rows are taken in canonical order, first in the in-process lock table
    /// and then in the database by touching each row, so the scope owns the
    /// SQLite write lock before it reads anything.
    pub async fn begin_locked(&self, ids: &[WalletId]) -> Result<CommitScope> {
        let rows = self.locks.acquire(ids, self.lock_timeout).await?;
        debug!(wallets = ?rows.wallets(), "acquired wallet locks");

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        for wallet_id in rows.wallets() {
            sqlx::query("UPDATE wallets SET balance = balance WHERE id = ?")
                .bind(wallet_id.to_string())
                .execute(&mut *tx)
                .await
                .context("Failed to lock wallet row")?;
        }

        Ok(CommitScope {
            tx,
            rows: Some(rows),
        })
    }

    /// Open a read-only view of the ledger. Every read made through one
    /// snapshot observes the same committed state.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin snapshot")?;
        Ok(Snapshot { tx })
    }
}

/// An atomic unit of ledger mutation.
///
/// Nothing written through a scope is visible until [`CommitScope::commit`].
/// Dropping the scope rolls the storage transaction back and then releases
/// its wallet locks.
pub struct CommitScope {
    // Field order matters: the transaction must end before the rows are released.
    tx: sqlx::Transaction<'static, Sqlite>,
    rows: Option<RowGuard>,
}

impl CommitScope {
    fn ensure_held(&self, wallet_id: WalletId) -> Result<()> {
        match &self.rows {
            Some(rows) if rows.holds(wallet_id) => Ok(()),
            _ => anyhow::bail!("Wallet {} is not locked in this scope", wallet_id),
        }
    }

    /// Re-read a wallet inside this scope.
    pub async fn fetch_wallet(&mut self, id: WalletId) -> Result<Option<Wallet>> {
        fetch_wallet(&mut self.tx, id).await
    }

    /// Save a new wallet.
    pub async fn insert_wallet(&mut self, wallet: &Wallet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (id, name, balance, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(wallet.id.to_string())
        .bind(&wallet.name)
        .bind(wallet.balance.to_string())
        .bind(wallet.created_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .context("Failed to save wallet")?;
        Ok(())
    }

    /// Write back a wallet's balance. The wallet must be locked by this scope.
    pub async fn update_balance(&mut self, wallet: &Wallet) -> Result<()> {
        self.ensure_held(wallet.id)?;

        let result = sqlx::query("UPDATE wallets SET balance = ? WHERE id = ?")
            .bind(wallet.balance.to_string())
            .bind(wallet.id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to update wallet balance")?;

        if result.rows_affected() != 1 {
            anyhow::bail!("Wallet {} disappeared during update", wallet.id);
        }
        Ok(())
    }

    /// Append a transaction to the log.
    /// Assigns the next sequence number; the owning wallet must be locked.
    pub async fn append_transaction(&mut self, transaction: &mut Transaction) -> Result<()> {
        self.ensure_held(transaction.wallet_id)?;

        let sequence = self.next_sequence().await?;
        transaction.sequence = sequence;

        sqlx::query(
            r#"
            INSERT INTO transactions (id, sequence, wallet_id, kind, value, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.sequence)
        .bind(transaction.wallet_id.to_string())
        .bind(transaction.kind.as_str())
        .bind(transaction.value.to_string())
        .bind(transaction.created_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .context("Failed to append transaction")?;

        Ok(())
    }

    /// Get the next sequence number and increment the counter.
    async fn next_sequence(&mut self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *self.tx)
        .await
        .context("Failed to get next sequence number")?;

        Ok(row.get("value"))
    }

    /// Make every mutation of this scope durable, then release its locks.
    pub async fn commit(self) -> Result<()> {
        let CommitScope { tx, rows } = self;
        tx.commit().await.context("Failed to commit transaction")?;
        drop(rows);
        Ok(())
    }
}

/// A read-only, consistent view of the ledger.
pub struct Snapshot {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl Snapshot {
    pub async fn fetch_wallet(&mut self, id: WalletId) -> Result<Option<Wallet>> {
        fetch_wallet(&mut self.tx, id).await
    }

    /// List all wallets, oldest first.
    pub async fn list_wallets(&mut self) -> Result<Vec<Wallet>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, balance, created_at
            FROM wallets
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .context("Failed to list wallets")?;

        rows.iter().map(row_to_wallet).collect()
    }

    /// List a wallet's transactions, ordered by sequence number.
    pub async fn list_transactions(&mut self, wallet_id: WalletId) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, wallet_id, kind, value, created_at
            FROM transactions
            WHERE wallet_id = ?
            ORDER BY sequence
            "#,
        )
        .bind(wallet_id.to_string())
        .fetch_all(&mut *self.tx)
        .await
        .context("Failed to list transactions for wallet")?;

        rows.iter().map(row_to_transaction).collect()
    }

    /// List the whole log, ordered by sequence number.
    pub async fn list_all_transactions(&mut self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, wallet_id, kind, value, created_at
            FROM transactions
            ORDER BY sequence
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(row_to_transaction).collect()
    }
}

/// True when `err` means the operation gave up waiting for a lock, either
/// one of ours or SQLite's.
pub fn is_lock_timeout(err: &anyhow::Error) -> bool {
    if err.downcast_ref::<LockTimeout>().is_some() {
        return true;
    }
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        Some(sqlx::Error::PoolTimedOut) => true,
        _ => false,
    }
}

pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
        _ => false,
    }
}

async fn fetch_wallet(conn: &mut SqliteConnection, id: WalletId) -> Result<Option<Wallet>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, balance, created_at
        FROM wallets
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to fetch wallet")?;

    match row {
        Some(row) => Ok(Some(row_to_wallet(&row)?)),
        None => Ok(None),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .context("Invalid timestamp")?
        .with_timezone(&Utc))
}

fn row_to_wallet(row: &SqliteRow) -> Result<Wallet> {
    let id_str: String = row.get("id");
    let balance_str: String = row.get("balance");
    let created_at_str: String = row.get("created_at");

    Ok(Wallet {
        id: Uuid::parse_str(&id_str).context("Invalid wallet ID")?,
        name: row.get("name"),
        balance: Decimal::from_str(&balance_str).context("Invalid wallet balance")?,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
    let id_str: String = row.get("id");
    let wallet_id_str: String = row.get("wallet_id");
    let kind_str: String = row.get("kind");
    let value_str: String = row.get("value");
    let created_at_str: String = row.get("created_at");

    Ok(Transaction {
        id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
        sequence: row.get("sequence"),
        wallet_id: Uuid::parse_str(&wallet_id_str).context("Invalid wallet ID")?,
        kind: TransactionKind::from_str(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid transaction kind: {}", kind_str))?,
        value: Decimal::from_str(&value_str).context("Invalid transaction value")?,
        created_at: parse_timestamp(&created_at_str)?,
    })
}
