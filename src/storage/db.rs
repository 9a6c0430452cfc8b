// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `withdrawals`: withdrawal id → serialized WithdrawalRequest (JSON)
//! - `withdrawal_keys`: idempotency key → withdrawal id
//! - `deposits`: chain tx id → serialized DepositRecord (JSON)
//! - `balances`: account id → serialized AccountBalance (JSON)
//! - `accounts`: identifier → serialized account registration (JSON)
//! - `budgets`: insertion counter → serialized TaskBudget (JSON)
//!
//! Every trait call runs in a single redb transaction, which provides the
//! per-call atomicity the engine's locking discipline requires.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    BalanceStore, BudgetSource, DepositStore, StorageError, StorageResult, WithdrawalStore,
};
use crate::models::{
    AccountBalance, AccountId, DepositRecord, DepositStatus, SubLedger, TaskBudget,
    WithdrawalRequest, WithdrawalStatus,
};

const WITHDRAWALS: TableDefinition<&str, &[u8]> = TableDefinition::new("withdrawals");
const WITHDRAWAL_KEYS: TableDefinition<&str, &str> = TableDefinition::new("withdrawal_keys");
const DEPOSITS: TableDefinition<&str, &[u8]> = TableDefinition::new("deposits");
const BALANCES: TableDefinition<i64, &[u8]> = TableDefinition::new("balances");
const ACCOUNTS: TableDefinition<i64, &[u8]> = TableDefinition::new("accounts");
const BUDGETS: TableDefinition<u64, &[u8]> = TableDefinition::new("budgets");

impl From<redb::DatabaseError> for StorageError {
    fn from(e: redb::DatabaseError) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<redb::TableError> for StorageError {
    fn from(e: redb::TableError) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(e: redb::StorageError) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(e: redb::CommitError) -> Self {
        Self::Database(e.to_string())
    }
}

/// Registration entry mapping a deposit identifier to an account.
#[derive(Serialize, Deserialize)]
struct AccountEntry {
    account_id: AccountId,
    #[serde(skip_serializing_if = "Option::is_none")]
    referrer: Option<AccountId>,
}

/// Embedded ACID ledger database.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(WITHDRAWALS)?;
            let _ = write_txn.open_table(WITHDRAWAL_KEYS)?;
            let _ = write_txn.open_table(DEPOSITS)?;
            let _ = write_txn.open_table(BALANCES)?;
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(BUDGETS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Register an account so deposit identifiers resolve to it.
    pub fn register_account(
        &self,
        account: AccountId,
        referrer: Option<AccountId>,
    ) -> StorageResult<()> {
        let entry = serde_json::to_vec(&AccountEntry {
            account_id: account,
            referrer,
        })?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ACCOUNTS)?;
            table.insert(account, entry.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Record a spending commitment for reconciliation.
    pub fn add_budget(&self, budget: &TaskBudget) -> StorageResult<()> {
        let json = serde_json::to_vec(budget)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(BUDGETS)?;
            let next = table.last()?.map(|(k, _)| k.value() + 1).unwrap_or(0);
            table.insert(next, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl WithdrawalStore for LedgerDb {
    fn insert(&self, record: &WithdrawalRequest) -> StorageResult<()> {
        let id = record.id.to_string();
        let json = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut keys = write_txn.open_table(WITHDRAWAL_KEYS)?;
            if keys.get(record.idempotency_key.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists(format!(
                    "idempotency key {}",
                    record.idempotency_key
                )));
            }
            let mut table = write_txn.open_table(WITHDRAWALS)?;
            if table.get(id.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists(format!("withdrawal {id}")));
            }
            keys.insert(record.idempotency_key.as_str(), id.as_str())?;
            table.insert(id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get(&self, id: Uuid) -> StorageResult<Option<WithdrawalRequest>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WITHDRAWALS)?;
        match table.get(id.to_string().as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn find_by_key(&self, idempotency_key: &str) -> StorageResult<Option<WithdrawalRequest>> {
        let read_txn = self.db.begin_read()?;
        let keys = read_txn.open_table(WITHDRAWAL_KEYS)?;
        let id = match keys.get(idempotency_key)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        let table = read_txn.open_table(WITHDRAWALS)?;
        match table.get(id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn update(&self, record: &WithdrawalRequest) -> StorageResult<()> {
        let id = record.id.to_string();
        let json = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(WITHDRAWALS)?;
            if table.get(id.as_str())?.is_none() {
                return Err(StorageError::NotFound(format!("withdrawal {id}")));
            }
            table.insert(id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn list(&self) -> StorageResult<Vec<WithdrawalRequest>> {
        let mut records = self.scan_withdrawals(|_| true)?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn list_unsent_pending(&self) -> StorageResult<Vec<WithdrawalRequest>> {
        self.scan_withdrawals(|r| r.status == WithdrawalStatus::Pending && !r.is_sent())
    }

    fn list_sent(&self) -> StorageResult<Vec<WithdrawalRequest>> {
        self.scan_withdrawals(|r| r.status == WithdrawalStatus::Sent)
    }
}

impl LedgerDb {
    fn scan_withdrawals(
        &self,
        keep: impl Fn(&WithdrawalRequest) -> bool,
    ) -> StorageResult<Vec<WithdrawalRequest>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WITHDRAWALS)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let record: WithdrawalRequest = serde_json::from_slice(value.value())?;
            if keep(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn scan_deposits(
        &self,
        keep: impl Fn(&DepositRecord) -> bool,
    ) -> StorageResult<Vec<DepositRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEPOSITS)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let record: DepositRecord = serde_json::from_slice(value.value())?;
            if keep(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }
}

impl DepositStore for LedgerDb {
    fn contains(&self, chain_tx_id: &str) -> StorageResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEPOSITS)?;
        Ok(table.get(chain_tx_id)?.is_some())
    }

    fn insert(&self, record: &DepositRecord) -> StorageResult<()> {
        let json = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DEPOSITS)?;
            if table.get(record.chain_tx_id.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists(format!(
                    "deposit {}",
                    record.chain_tx_id
                )));
            }
            table.insert(record.chain_tx_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn update(&self, record: &DepositRecord) -> StorageResult<()> {
        let json = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DEPOSITS)?;
            if table.get(record.chain_tx_id.as_str())?.is_none() {
                return Err(StorageError::NotFound(format!(
                    "deposit {}",
                    record.chain_tx_id
                )));
            }
            table.insert(record.chain_tx_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn list_by_account(&self, account: AccountId) -> StorageResult<Vec<DepositRecord>> {
        self.scan_deposits(|d| d.matched_account_id == Some(account))
    }

    fn list_unmatched(&self) -> StorageResult<Vec<DepositRecord>> {
        self.scan_deposits(|d| d.status == DepositStatus::Unmatched)
    }
}

impl BalanceStore for LedgerDb {
    fn get(&self, account: AccountId) -> StorageResult<Option<AccountBalance>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BALANCES)?;
        match table.get(account)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn adjust(
        &self,
        account: AccountId,
        sub: SubLedger,
        delta: i64,
    ) -> StorageResult<AccountBalance> {
        let write_txn = self.db.begin_write()?;
        let balance = {
            let mut table = write_txn.open_table(BALANCES)?;
            let mut balance = match table.get(account)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => AccountBalance::zero(account),
            };
            balance.apply(sub, delta);
            let json = serde_json::to_vec(&balance)?;
            table.insert(account, json.as_slice())?;
            balance
        };
        write_txn.commit()?;
        Ok(balance)
    }

    fn set_active(&self, account: AccountId, value: i64) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(BALANCES)?;
            let mut balance = match table.get(account)? {
                Some(existing) => serde_json::from_slice(existing.value())?,
                None => AccountBalance::zero(account),
            };
            balance.active = value;
            let json = serde_json::to_vec(&balance)?;
            table.insert(account, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn find_account_by_identifier(&self, identifier: i64) -> StorageResult<Option<AccountId>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        match table.get(identifier)? {
            Some(value) => {
                let entry: AccountEntry = serde_json::from_slice(value.value())?;
                Ok(Some(entry.account_id))
            }
            None => Ok(None),
        }
    }

    fn referrer_of(&self, account: AccountId) -> StorageResult<Option<AccountId>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        match table.get(account)? {
            Some(value) => {
                let entry: AccountEntry = serde_json::from_slice(value.value())?;
                Ok(entry.referrer)
            }
            None => Ok(None),
        }
    }
}

impl BudgetSource for LedgerDb {
    fn budgets_for(&self, account: AccountId) -> StorageResult<Vec<TaskBudget>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BUDGETS)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let budget: TaskBudget = serde_json::from_slice(value.value())?;
            if budget.account_id == account {
                out.push(budget);
            }
        }
        Ok(out)
    }
}
