// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settlement ledger: the state machines that move value.
//!
//! - `withdrawals` - idempotent outbound-payment state machine
//! - `deposits` - incoming-transfer scanner and attribution
//! - `balance` - per-account balance operations
//! - `reconcile` - balance recomputation from authoritative records
//! - `comment` - identifier extraction from transfer comments

pub mod balance;
pub mod comment;
pub mod deposits;
pub mod reconcile;
pub mod withdrawals;

pub use balance::Balances;
pub use deposits::{DepositScanner, ScanSummary};
pub use reconcile::{BalanceReconciler, ReconcileReport};
pub use withdrawals::WithdrawalLedger;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::AccountId;

/// Per-account lock map.
///
/// The balance for a given account may be mutated by at most one logical
/// operation at a time; the withdrawal ledger, deposit scanner and
/// reconciler all take the account's lock around their read-modify-write
/// sequences. This is a narrower scope than the wallet send lock and may
/// be held concurrently with it.
#[derive(Default)]
pub struct AccountLocks {
    inner: Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one account, creating it on first use.
    pub async fn acquire(&self, account: AccountId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("lock map poisoned");
            Arc::clone(map.entry(account).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_account_serializes_different_accounts_do_not() {
        let locks = Arc::new(AccountLocks::new());

        let guard_a = locks.acquire(1).await;
        // A different account's lock is immediately available.
        let _guard_b = locks.acquire(2).await;

        // The same account's lock is held.
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(20), locks.acquire(1))
                .await
                .is_err()
        );

        drop(guard_a);
        let _reacquired = locks.acquire(1).await;
    }
}
