use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

use crate::domain::{canonical_order, WalletId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("timed out after {waited:?} waiting for wallet locks")]
pub struct LockTimeout {
    pub wallets: Vec<WalletId>,
    pub waited: Duration,
}

/// Per-wallet exclusive locks held for the duration of a commit scope.
///
/// Lock sets are always acquired in canonical (ascending id) order, so two
/// scopes that need the same pair of wallets queue on the same first lock
/// instead of each holding one and waiting for the other.
#[derive(Debug, Default)]
pub struct RowLocks {
    rows: Mutex<HashMap<WalletId, Arc<RowMutex<()>>>>,
}

/// Proof that every listed wallet row is exclusively held.
/// Dropping it releases the rows.
#[derive(Debug)]
pub struct RowGuard {
    wallets: Vec<WalletId>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl RowGuard {
    /// The held wallets, in the order they were acquired.
    pub fn wallets(&self) -> &[WalletId] {
        &self.wallets
    }

    pub fn holds(&self, wallet_id: WalletId) -> bool {
        self.wallets.contains(&wallet_id)
    }
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&self, wallet_id: WalletId) -> Arc<RowMutex<()>> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.entry(wallet_id).or_default().clone()
    }

    /// Block until every wallet in `ids` is held, or fail once `timeout`
    /// has elapsed. Rows acquired before a timeout are released.
    pub async fn acquire(
        &self,
        ids: &[WalletId],
        timeout: Duration,
    ) -> Result<RowGuard, LockTimeout> {
        let wallets = canonical_order(ids);

        let acquire_all = async {
            let mut guards = Vec::with_capacity(wallets.len());
            for wallet_id in &wallets {
                guards.push(self.row(*wallet_id).lock_owned().await);
            }
            guards
        };

        match tokio::time::timeout(timeout, acquire_all).await {
            Ok(guards) => Ok(RowGuard {
                wallets,
                _guards: guards,
            }),
            Err(_) => Err(LockTimeout {
                wallets,
                waited: timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn test_acquire_orders_and_dedups() {
        let locks = RowLocks::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let guard = locks
            .acquire(&[b, a, b], Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(guard.wallets(), canonical_order(&[a, b]).as_slice());
        assert!(guard.holds(a));
        assert!(guard.holds(b));
    }

    #[tokio::test]
    async fn test_contended_row_times_out() {
        let locks = RowLocks::new();
        let a = Uuid::new_v4();

        let _held = locks.acquire(&[a], Duration::from_secs(1)).await.unwrap();
        let err = locks
            .acquire(&[a], Duration::from_millis(20))
            .await
            .unwrap_err();

        assert_eq!(err.wallets, vec![a]);
    }

    #[tokio::test]
    async fn test_timeout_releases_partial_acquisition() {
        let locks = RowLocks::new();
        let ids = canonical_order(&[Uuid::new_v4(), Uuid::new_v4()]);
        let (first, second) = (ids[0], ids[1]);

        // Holding the second row makes a pair acquisition stall after taking the first.
        let held = locks.acquire(&[second], Duration::from_secs(1)).await.unwrap();
        assert!(
            locks
                .acquire(&[first, second], Duration::from_millis(20))
                .await
                .is_err()
        );

        // The first row must be free again.
        assert!(locks.acquire(&[first], Duration::from_millis(20)).await.is_ok());
        drop(held);
        assert!(
            locks
                .acquire(&[first, second], Duration::from_millis(20))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let locks = RowLocks::new();
        let a = Uuid::new_v4();

        let guard = locks.acquire(&[a], Duration::from_secs(1)).await.unwrap();
        drop(guard);

        assert!(locks.acquire(&[a], Duration::from_millis(20)).await.is_ok());
    }
}
