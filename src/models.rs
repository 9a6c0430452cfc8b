// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Core ledger records.
//!
//! All amounts are integer smallest units (`u64` for transfer amounts,
//! `i64` for stored balances, which reconciliation may transiently drive
//! negative). Records serialize with serde; the stores persist them as
//! JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric account reference, as embedded in deposit comments.
pub type AccountId = i64;

/// Outbound withdrawal lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    /// Created, no chain id yet; the balance is untouched.
    Pending,
    /// Broadcast accepted, chain id assigned, balance debited.
    Sent,
    /// The chain reports the transaction executed.
    Confirmed,
    /// Terminal failure. Funds were only debited if a chain id exists,
    /// in which case a compensating credit has been applied.
    Failed,
}

impl WithdrawalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

/// One outbound payment intent. Never deleted; retained as an audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    /// Single source of deduplication for caller retries.
    pub idempotency_key: String,
    /// Absent for operator withdrawals from the custodial wallet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beneficiary_id: Option<AccountId>,
    pub destination: String,
    /// Amount in smallest units.
    pub amount: u64,
    pub status: WithdrawalStatus,
    /// Set exactly once, when a broadcast succeeds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_tx_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Operator annotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalRequest {
    /// Create a new request in `Pending` with no balance mutation.
    pub fn new_pending(
        idempotency_key: String,
        beneficiary_id: Option<AccountId>,
        destination: String,
        amount: u64,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            idempotency_key,
            beneficiary_id,
            destination,
            amount,
            status: WithdrawalStatus::Pending,
            chain_tx_id: None,
            error_detail: None,
            notes,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a successful broadcast. The caller debits the balance in the
    /// same logical step.
    pub fn mark_sent(&mut self, chain_tx_id: String) {
        self.status = WithdrawalStatus::Sent;
        self.chain_tx_id = Some(chain_tx_id);
        self.error_detail = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_confirmed(&mut self) {
        self.status = WithdrawalStatus::Confirmed;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, detail: impl Into<String>) {
        self.status = WithdrawalStatus::Failed;
        self.error_detail = Some(detail.into());
        self.updated_at = Utc::now();
    }

    /// Record one failed send attempt, appending to the audit detail.
    pub fn record_attempt(&mut self, detail: &str) {
        self.attempt_count += 1;
        let entry = format!("attempt {} failed: {}", self.attempt_count, detail);
        self.error_detail = Some(match self.error_detail.take() {
            Some(prior) => format!("{prior}; {entry}"),
            None => entry,
        });
        self.updated_at = Utc::now();
    }

    /// Whether the request has been broadcast (and the balance debited).
    pub fn is_sent(&self) -> bool {
        self.chain_tx_id.is_some()
    }
}

/// Inbound deposit lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    /// Observed but not attributed to an account.
    Unmatched,
    /// Attributed and credited, exactly once.
    Credited,
    /// Operator-rejected; never credited.
    Rejected,
}

/// One observed incoming transfer, keyed by chain transaction id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRecord {
    /// Natural idempotency boundary: one record per chain transaction.
    pub chain_tx_id: String,
    pub source_address: String,
    /// Amount in smallest units.
    pub amount: u64,
    /// Identifier parsed from the transfer comment, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_identifier: Option<AccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_account_id: Option<AccountId>,
    pub status: DepositStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DepositRecord {
    pub fn new_unmatched(
        chain_tx_id: String,
        source_address: String,
        amount: u64,
        extracted_identifier: Option<AccountId>,
    ) -> Self {
        Self {
            chain_tx_id,
            source_address,
            amount,
            extracted_identifier,
            matched_account_id: None,
            status: DepositStatus::Unmatched,
            credited_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_credited(&mut self, account: AccountId) {
        self.status = DepositStatus::Credited;
        self.matched_account_id = Some(account);
        self.credited_at = Some(Utc::now());
    }
}

/// Balance sub-ledger selector for adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubLedger {
    Active,
    Escrow,
    ReferralEarned,
}

/// Per-account balance: spendable funds, escrowed commitments, and
/// referral earnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub active: i64,
    pub escrow: i64,
    pub referral_earned: i64,
}

impl AccountBalance {
    pub fn zero(account_id: AccountId) -> Self {
        Self {
            account_id,
            active: 0,
            escrow: 0,
            referral_earned: 0,
        }
    }

    pub fn get(&self, sub: SubLedger) -> i64 {
        match sub {
            SubLedger::Active => self.active,
            SubLedger::Escrow => self.escrow,
            SubLedger::ReferralEarned => self.referral_earned,
        }
    }

    pub fn apply(&mut self, sub: SubLedger, delta: i64) {
        let slot = match sub {
            SubLedger::Active => &mut self.active,
            SubLedger::Escrow => &mut self.escrow,
            SubLedger::ReferralEarned => &mut self.referral_earned,
        };
        *slot += delta;
    }
}

/// A spending commitment reserving part of an account's active balance.
/// The reconciler subtracts the full budget of every non-cancelled
/// commitment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBudget {
    pub account_id: AccountId,
    pub total_slots: u32,
    /// Price per slot in smallest units.
    pub price_per_slot: u64,
    pub cancelled: bool,
}

impl TaskBudget {
    /// Reserved amount: all slots at full price.
    pub fn reserved(&self) -> u64 {
        self.total_slots as u64 * self.price_per_slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn withdrawal_lifecycle_transitions() {
        let mut req = WithdrawalRequest::new_pending(
            "k1".into(),
            Some(555_555_555),
            "0:aa".into(),
            1_000,
            None,
        );
        assert_eq!(req.status, WithdrawalStatus::Pending);
        assert!(!req.is_sent());

        req.mark_sent("abc".into());
        assert_eq!(req.status, WithdrawalStatus::Sent);
        assert!(req.is_sent());
        assert_eq!(req.chain_tx_id.as_deref(), Some("abc"));

        req.mark_confirmed();
        assert!(req.status.is_terminal());
    }

    #[test]
    fn record_attempt_appends_detail() {
        let mut req =
            WithdrawalRequest::new_pending("k".into(), None, "0:aa".into(), 1, None);
        req.record_attempt("timeout");
        req.record_attempt("connection refused");
        assert_eq!(req.attempt_count, 2);
        let detail = req.error_detail.unwrap();
        assert!(detail.contains("attempt 1 failed: timeout"));
        assert!(detail.contains("attempt 2 failed: connection refused"));
    }

    #[test]
    fn mark_sent_clears_transient_errors() {
        let mut req =
            WithdrawalRequest::new_pending("k".into(), None, "0:aa".into(), 1, None);
        req.record_attempt("timeout");
        req.mark_sent("tx".into());
        assert!(req.error_detail.is_none());
    }

    #[test]
    fn balance_apply_targets_sub_ledger() {
        let mut balance = AccountBalance::zero(1);
        balance.apply(SubLedger::Active, 100);
        balance.apply(SubLedger::Escrow, 40);
        balance.apply(SubLedger::Active, -30);
        assert_eq!(balance.active, 70);
        assert_eq!(balance.escrow, 40);
        assert_eq!(balance.referral_earned, 0);
    }

    #[test]
    fn task_budget_reserves_all_slots() {
        let budget = TaskBudget {
            account_id: 1,
            total_slots: 10,
            price_per_slot: 500_000_000,
            cancelled: false,
        };
        assert_eq!(budget.reserved(), 5_000_000_000);
    }

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&WithdrawalStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&DepositStatus::Credited).unwrap(),
            "\"credited\""
        );
    }
}
