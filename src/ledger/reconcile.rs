// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Balance reconciliation against authoritative records.
//!
//! The stored active balance is maintained incrementally and can drift
//! (missed compensating credit, interrupted escrow move). The reconciler
//! recomputes it from its three authoritative inputs:
//!
//! ```text
//! active = Σ credited deposits
//!        − Σ withdrawals that reached Sent or Confirmed
//!        − Σ reserved budgets of non-cancelled spending commitments
//! ```
//!
//! and overwrites the stored value when they differ. Idempotent: with no
//! intervening activity a second pass reports a zero delta.

use std::sync::Arc;

use serde::Serialize;

use crate::error::EngineError;
use crate::ledger::{AccountLocks, Balances};
use crate::models::{AccountId, DepositStatus, WithdrawalStatus};
use crate::storage::{BalanceStore, BudgetSource, DepositStore, WithdrawalStore};

/// Result of one reconciliation pass over an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub account_id: AccountId,
    pub old_balance: i64,
    pub new_balance: i64,
    pub delta: i64,
}

pub struct BalanceReconciler {
    deposits: Arc<dyn DepositStore>,
    withdrawals: Arc<dyn WithdrawalStore>,
    budgets: Arc<dyn BudgetSource>,
    balances: Arc<Balances>,
    locks: Arc<AccountLocks>,
}

impl BalanceReconciler {
    pub fn new(
        deposits: Arc<dyn DepositStore>,
        withdrawals: Arc<dyn WithdrawalStore>,
        budgets: Arc<dyn BudgetSource>,
        balances: Arc<Balances>,
        locks: Arc<AccountLocks>,
    ) -> Self {
        Self {
            deposits,
            withdrawals,
            budgets,
            balances,
            locks,
        }
    }

    /// Recompute the correct active balance from authoritative inputs.
    /// May legitimately be negative while in-flight state settles.
    pub fn recompute(&self, account: AccountId) -> Result<i64, EngineError> {
        let deposited: i64 = self
            .deposits
            .list_by_account(account)?
            .iter()
            .filter(|d| d.status == DepositStatus::Credited)
            .map(|d| d.amount as i64)
            .sum();

        let withdrawn: i64 = self
            .withdrawals
            .list()?
            .iter()
            .filter(|w| w.beneficiary_id == Some(account))
            .filter(|w| {
                matches!(
                    w.status,
                    WithdrawalStatus::Sent | WithdrawalStatus::Confirmed
                )
            })
            .map(|w| w.amount as i64)
            .sum();

        let reserved: i64 = self
            .budgets
            .budgets_for(account)?
            .iter()
            .filter(|b| !b.cancelled)
            .map(|b| b.reserved() as i64)
            .sum();

        Ok(deposited - withdrawn - reserved)
    }

    /// Recompute and, if the stored balance drifted, overwrite it.
    pub async fn reconcile(&self, account: AccountId) -> Result<ReconcileReport, EngineError> {
        let _guard = self.locks.acquire(account).await;

        let old_balance = self.balances.get(account)?.active;
        let new_balance = self.recompute(account)?;
        let delta = new_balance - old_balance;

        if delta != 0 {
            self.balances.store().set_active(account, new_balance)?;
            tracing::warn!(
                account,
                old_balance,
                new_balance,
                delta,
                "balance drift corrected"
            );
        }

        Ok(ReconcileReport {
            account_id: account,
            old_balance,
            new_balance,
            delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DepositRecord, TaskBudget, WithdrawalRequest};
    use crate::storage::{BalanceStore, MemoryStore};

    const ACCOUNT: AccountId = 42;

    struct Fixture {
        reconciler: BalanceReconciler,
        store: Arc<MemoryStore>,
        balances: Arc<Balances>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(AccountLocks::new());
        let balances = Arc::new(Balances::new(
            store.clone() as Arc<dyn BalanceStore>,
            locks.clone(),
        ));
        let reconciler = BalanceReconciler::new(
            store.clone(),
            store.clone(),
            store.clone(),
            balances.clone(),
            locks,
        );
        Fixture {
            reconciler,
            store,
            balances,
        }
    }

    fn credited_deposit(fixture: &Fixture, tx: &str, amount: u64) {
        let mut record = DepositRecord::new_unmatched(tx.into(), "0:src".into(), amount, None);
        record.mark_credited(ACCOUNT);
        DepositStore::insert(fixture.store.as_ref(), &record).unwrap();
    }

    fn withdrawal(fixture: &Fixture, key: &str, amount: u64, status: WithdrawalStatus) {
        let mut record =
            WithdrawalRequest::new_pending(key.into(), Some(ACCOUNT), "0:dst".into(), amount, None);
        match status {
            WithdrawalStatus::Pending => {}
            WithdrawalStatus::Sent => record.mark_sent(format!("tx-{key}")),
            WithdrawalStatus::Confirmed => {
                record.mark_sent(format!("tx-{key}"));
                record.mark_confirmed();
            }
            WithdrawalStatus::Failed => record.mark_failed("nope"),
        }
        WithdrawalStore::insert(fixture.store.as_ref(), &record).unwrap();
    }

    #[tokio::test]
    async fn recompute_sums_authoritative_inputs() {
        let fixture = fixture();
        credited_deposit(&fixture, "d1", 10_000);
        credited_deposit(&fixture, "d2", 5_000);
        withdrawal(&fixture, "w1", 3_000, WithdrawalStatus::Sent);
        withdrawal(&fixture, "w2", 1_000, WithdrawalStatus::Confirmed);
        // Never-sent and failed withdrawals do not count.
        withdrawal(&fixture, "w3", 9_000, WithdrawalStatus::Pending);
        withdrawal(&fixture, "w4", 9_000, WithdrawalStatus::Failed);
        fixture.store.add_budget(TaskBudget {
            account_id: ACCOUNT,
            total_slots: 4,
            price_per_slot: 500,
            cancelled: false,
        });
        fixture.store.add_budget(TaskBudget {
            account_id: ACCOUNT,
            total_slots: 100,
            price_per_slot: 100,
            cancelled: true,
        });

        // 15_000 - 4_000 - 2_000
        assert_eq!(fixture.reconciler.recompute(ACCOUNT).unwrap(), 9_000);
    }

    #[tokio::test]
    async fn reconcile_corrects_drift_and_is_idempotent() {
        let fixture = fixture();
        credited_deposit(&fixture, "d1", 10_000);
        fixture.balances.store().set_active(ACCOUNT, 7_500).unwrap();

        let report = fixture.reconciler.reconcile(ACCOUNT).await.unwrap();
        assert_eq!(report.old_balance, 7_500);
        assert_eq!(report.new_balance, 10_000);
        assert_eq!(report.delta, 2_500);
        assert_eq!(fixture.balances.get(ACCOUNT).unwrap().active, 10_000);

        let second = fixture.reconciler.reconcile(ACCOUNT).await.unwrap();
        assert_eq!(second.delta, 0);
        assert_eq!(second.new_balance, 10_000);
    }

    #[tokio::test]
    async fn untouched_account_reconciles_to_zero() {
        let fixture = fixture();
        let report = fixture.reconciler.reconcile(ACCOUNT).await.unwrap();
        assert_eq!(report.old_balance, 0);
        assert_eq!(report.new_balance, 0);
        assert_eq!(report.delta, 0);
    }

    #[tokio::test]
    async fn over_committed_account_goes_negative() {
        let fixture = fixture();
        credited_deposit(&fixture, "d1", 1_000);
        fixture.store.add_budget(TaskBudget {
            account_id: ACCOUNT,
            total_slots: 3,
            price_per_slot: 500,
            cancelled: false,
        });

        let report = fixture.reconciler.reconcile(ACCOUNT).await.unwrap();
        assert_eq!(report.new_balance, -500);
    }
}
