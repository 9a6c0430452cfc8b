// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persistent stores consumed by the settlement engine.
//!
//! The engine owns the settlement *logic*; record and balance persistence
//! is a collaborator behind these traits. Two implementations ship
//! in-crate:
//!
//! - [`MemoryStore`] - mutex-guarded maps, for tests and development
//! - [`LedgerDb`] - embedded redb database (pure Rust, ACID), for the
//!   daemon
//!
//! Implementations must make each call atomic: balance read-modify-write
//! happens inside a single [`BalanceStore::adjust`] call, which is what
//! keeps concurrent mutators from losing updates.

pub mod db;
pub mod memory;

pub use db::LedgerDb;
pub use memory::MemoryStore;

use crate::models::{
    AccountBalance, AccountId, DepositRecord, SubLedger, TaskBudget, WithdrawalRequest,
};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence for [`WithdrawalRequest`] records, keyed by id with a
/// unique index on the idempotency key.
pub trait WithdrawalStore: Send + Sync {
    /// Insert a new record; fails if the id or idempotency key exists.
    fn insert(&self, record: &WithdrawalRequest) -> StorageResult<()>;

    fn get(&self, id: Uuid) -> StorageResult<Option<WithdrawalRequest>>;

    fn find_by_key(&self, idempotency_key: &str) -> StorageResult<Option<WithdrawalRequest>>;

    /// Overwrite an existing record.
    fn update(&self, record: &WithdrawalRequest) -> StorageResult<()>;

    /// All records, newest first.
    fn list(&self) -> StorageResult<Vec<WithdrawalRequest>>;

    /// Pending records that never got a chain id (candidates for the
    /// retry sweep).
    fn list_unsent_pending(&self) -> StorageResult<Vec<WithdrawalRequest>>;

    /// Sent records awaiting confirmation (candidates for the status
    /// sweep).
    fn list_sent(&self) -> StorageResult<Vec<WithdrawalRequest>>;
}

/// Persistence for [`DepositRecord`]s, keyed by chain transaction id.
pub trait DepositStore: Send + Sync {
    fn contains(&self, chain_tx_id: &str) -> StorageResult<bool>;

    /// Insert a new record; fails if the chain transaction id exists.
    fn insert(&self, record: &DepositRecord) -> StorageResult<()>;

    fn update(&self, record: &DepositRecord) -> StorageResult<()>;

    fn list_by_account(&self, account: AccountId) -> StorageResult<Vec<DepositRecord>>;

    /// Records still awaiting attribution.
    fn list_unmatched(&self) -> StorageResult<Vec<DepositRecord>>;
}

/// Per-account balance storage and account resolution.
pub trait BalanceStore: Send + Sync {
    fn get(&self, account: AccountId) -> StorageResult<Option<AccountBalance>>;

    /// Atomically create-or-adjust one sub-ledger of an account balance
    /// and return the result.
    fn adjust(&self, account: AccountId, sub: SubLedger, delta: i64)
        -> StorageResult<AccountBalance>;

    /// Overwrite the active balance (reconciler only).
    fn set_active(&self, account: AccountId, value: i64) -> StorageResult<()>;

    /// Resolve an identifier extracted from a deposit comment to a known
    /// account. `None` when no such account is registered (yet).
    fn find_account_by_identifier(&self, identifier: i64) -> StorageResult<Option<AccountId>>;

    /// Referrer of an account, if any; earns the reward commission.
    fn referrer_of(&self, account: AccountId) -> StorageResult<Option<AccountId>>;
}

/// Source of an account's spending commitments for reconciliation.
pub trait BudgetSource: Send + Sync {
    /// All commitments of the account, cancelled ones included; the
    /// reconciler filters.
    fn budgets_for(&self, account: AccountId) -> StorageResult<Vec<TaskBudget>>;
}
