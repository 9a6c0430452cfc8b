// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory store for tests and development.
//!
//! A single mutex over the maps gives every trait call the per-call
//! atomicity the engine relies on.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use super::{
    BalanceStore, BudgetSource, DepositStore, StorageError, StorageResult, WithdrawalStore,
};
use crate::models::{
    AccountBalance, AccountId, DepositRecord, SubLedger, TaskBudget, WithdrawalRequest,
    WithdrawalStatus,
};

#[derive(Default)]
struct Inner {
    withdrawals: HashMap<Uuid, WithdrawalRequest>,
    withdrawal_keys: HashMap<String, Uuid>,
    deposits: HashMap<String, DepositRecord>,
    balances: HashMap<AccountId, AccountBalance>,
    /// identifier -> account id (registered accounts only)
    accounts: HashMap<i64, AccountId>,
    referrers: HashMap<AccountId, AccountId>,
    budgets: Vec<TaskBudget>,
}

/// Mutex-guarded in-memory implementation of all store traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account so deposit identifiers resolve to it.
    pub fn register_account(&self, account: AccountId, referrer: Option<AccountId>) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.accounts.insert(account, account);
        if let Some(referrer) = referrer {
            inner.referrers.insert(account, referrer);
        }
    }

    /// Record a spending commitment for reconciliation.
    pub fn add_budget(&self, budget: TaskBudget) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.budgets.push(budget);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex poisoned")
    }
}

impl WithdrawalStore for MemoryStore {
    fn insert(&self, record: &WithdrawalRequest) -> StorageResult<()> {
        let mut inner = self.lock();
        if inner.withdrawal_keys.contains_key(&record.idempotency_key) {
            return Err(StorageError::AlreadyExists(format!(
                "idempotency key {}",
                record.idempotency_key
            )));
        }
        if inner.withdrawals.contains_key(&record.id) {
            return Err(StorageError::AlreadyExists(format!("withdrawal {}", record.id)));
        }
        inner
            .withdrawal_keys
            .insert(record.idempotency_key.clone(), record.id);
        inner.withdrawals.insert(record.id, record.clone());
        Ok(())
    }

    fn get(&self, id: Uuid) -> StorageResult<Option<WithdrawalRequest>> {
        Ok(self.lock().withdrawals.get(&id).cloned())
    }

    fn find_by_key(&self, idempotency_key: &str) -> StorageResult<Option<WithdrawalRequest>> {
        let inner = self.lock();
        Ok(inner
            .withdrawal_keys
            .get(idempotency_key)
            .and_then(|id| inner.withdrawals.get(id))
            .cloned())
    }

    fn update(&self, record: &WithdrawalRequest) -> StorageResult<()> {
        let mut inner = self.lock();
        if !inner.withdrawals.contains_key(&record.id) {
            return Err(StorageError::NotFound(format!("withdrawal {}", record.id)));
        }
        inner.withdrawals.insert(record.id, record.clone());
        Ok(())
    }

    fn list(&self) -> StorageResult<Vec<WithdrawalRequest>> {
        let mut records: Vec<_> = self.lock().withdrawals.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn list_unsent_pending(&self) -> StorageResult<Vec<WithdrawalRequest>> {
        Ok(self
            .lock()
            .withdrawals
            .values()
            .filter(|r| r.status == WithdrawalStatus::Pending && !r.is_sent())
            .cloned()
            .collect())
    }

    fn list_sent(&self) -> StorageResult<Vec<WithdrawalRequest>> {
        Ok(self
            .lock()
            .withdrawals
            .values()
            .filter(|r| r.status == WithdrawalStatus::Sent)
            .cloned()
            .collect())
    }
}

impl DepositStore for MemoryStore {
    fn contains(&self, chain_tx_id: &str) -> StorageResult<bool> {
        Ok(self.lock().deposits.contains_key(chain_tx_id))
    }

    fn insert(&self, record: &DepositRecord) -> StorageResult<()> {
        let mut inner = self.lock();
        if inner.deposits.contains_key(&record.chain_tx_id) {
            return Err(StorageError::AlreadyExists(format!(
                "deposit {}",
                record.chain_tx_id
            )));
        }
        inner
            .deposits
            .insert(record.chain_tx_id.clone(), record.clone());
        Ok(())
    }

    fn update(&self, record: &DepositRecord) -> StorageResult<()> {
        let mut inner = self.lock();
        if !inner.deposits.contains_key(&record.chain_tx_id) {
            return Err(StorageError::NotFound(format!(
                "deposit {}",
                record.chain_tx_id
            )));
        }
        inner
            .deposits
            .insert(record.chain_tx_id.clone(), record.clone());
        Ok(())
    }

    fn list_by_account(&self, account: AccountId) -> StorageResult<Vec<DepositRecord>> {
        Ok(self
            .lock()
            .deposits
            .values()
            .filter(|d| d.matched_account_id == Some(account))
            .cloned()
            .collect())
    }

    fn list_unmatched(&self) -> StorageResult<Vec<DepositRecord>> {
        Ok(self
            .lock()
            .deposits
            .values()
            .filter(|d| d.status == crate::models::DepositStatus::Unmatched)
            .cloned()
            .collect())
    }
}

impl BalanceStore for MemoryStore {
    fn get(&self, account: AccountId) -> StorageResult<Option<AccountBalance>> {
        Ok(self.lock().balances.get(&account).copied())
    }

    fn adjust(
        &self,
        account: AccountId,
        sub: SubLedger,
        delta: i64,
    ) -> StorageResult<AccountBalance> {
        let mut inner = self.lock();
        let balance = inner
            .balances
            .entry(account)
            .or_insert_with(|| AccountBalance::zero(account));
        balance.apply(sub, delta);
        Ok(*balance)
    }

    fn set_active(&self, account: AccountId, value: i64) -> StorageResult<()> {
        let mut inner = self.lock();
        let balance = inner
            .balances
            .entry(account)
            .or_insert_with(|| AccountBalance::zero(account));
        balance.active = value;
        Ok(())
    }

    fn find_account_by_identifier(&self, identifier: i64) -> StorageResult<Option<AccountId>> {
        Ok(self.lock().accounts.get(&identifier).copied())
    }

    fn referrer_of(&self, account: AccountId) -> StorageResult<Option<AccountId>> {
        Ok(self.lock().referrers.get(&account).copied())
    }
}

impl BudgetSource for MemoryStore {
    fn budgets_for(&self, account: AccountId) -> StorageResult<Vec<TaskBudget>> {
        Ok(self
            .lock()
            .budgets
            .iter()
            .filter(|b| b.account_id == account)
            .cloned()
            .collect())
    }
}
