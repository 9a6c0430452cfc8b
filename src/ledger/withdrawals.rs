// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Idempotent outbound-payment state machine.
//!
//! Lifecycle: Pending (no chain id, balance untouched) → Sent (chain id
//! assigned, balance debited) → Confirmed | Failed.
//!
//! The central invariant: a balance debit happens exactly once, at the
//! Pending→Sent transition, only after the chain accepted the broadcast.
//! A request that never reaches Sent leaves the balance untouched, so
//! abandoning it needs no compensation. The one compensating credit is the
//! post-debit path, when the chain later rejects a transaction that was
//! already debited at broadcast time.
//!
//! All broadcasts for the custodial wallet serialize behind one lock
//! around fetch-seqno → build → sign → broadcast; the wallet contract
//! accepts exactly one transaction per sequence number, and racing that
//! constraint produces failures that look like (but are not)
//! balance-affecting ones.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::chain::{build_transfer, ChainClient, ChainError, TxStatus};
use crate::error::EngineError;
use crate::ledger::Balances;
use crate::models::{AccountId, WithdrawalRequest};
use crate::storage::{StorageError, WithdrawalStore};
use crate::wallet::{WalletAddress, WalletKeys};

/// Attempts made synchronously before leaving a request to the sweep.
const SYNC_ATTEMPTS: u32 = 3;

/// Total attempt ceiling across the synchronous path and the sweep.
const MAX_ATTEMPTS: u32 = 5;

/// Wall-clock ceiling for unsent pending requests.
const MAX_PENDING_AGE_MINUTES: i64 = 10;

/// Pending requests retried per sweep.
const SWEEP_BATCH: usize = 10;

/// Delay between synchronous retry attempts.
const RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

/// Signing context for the custodial wallet.
pub struct SignerContext {
    pub keys: WalletKeys,
    pub address: WalletAddress,
}

/// The outbound-payment ledger.
pub struct WithdrawalLedger {
    store: Arc<dyn WithdrawalStore>,
    balances: Arc<Balances>,
    chain: Arc<dyn ChainClient>,
    signer: Option<Arc<SignerContext>>,
    /// Serializes fetch-seqno → build → sign → broadcast for the wallet.
    send_lock: tokio::sync::Mutex<()>,
}

impl WithdrawalLedger {
    pub fn new(
        store: Arc<dyn WithdrawalStore>,
        balances: Arc<Balances>,
        chain: Arc<dyn ChainClient>,
        signer: Option<Arc<SignerContext>>,
    ) -> Self {
        Self {
            store,
            balances,
            chain,
            signer,
            send_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn signer(&self) -> Result<&Arc<SignerContext>, EngineError> {
        self.signer.as_ref().ok_or_else(|| {
            EngineError::NotConfigured("custodial wallet signing is not configured".to_string())
        })
    }

    /// Create (or return) a withdrawal for a beneficiary account and make
    /// the initial send attempt.
    ///
    /// Calling again with the same idempotency key returns the existing
    /// record unchanged: no new debit, no new broadcast.
    pub async fn request_withdrawal(
        &self,
        idempotency_key: Option<String>,
        beneficiary: AccountId,
        destination: &str,
        amount: u64,
    ) -> Result<WithdrawalRequest, EngineError> {
        let key = idempotency_key.unwrap_or_else(|| Uuid::new_v4().to_string());
        if let Some(existing) = self.store.find_by_key(&key)? {
            return Ok(existing);
        }

        self.signer()?;
        let destination = validate_request(destination, amount)?;
        let balance = self.balances.get(beneficiary)?;
        if balance.active < amount as i64 {
            return Err(EngineError::InsufficientFunds {
                available: balance.active,
                requested: amount,
            });
        }

        let mut record = WithdrawalRequest::new_pending(
            key.clone(),
            Some(beneficiary),
            destination.to_string(),
            amount,
            None,
        );
        match self.store.insert(&record) {
            Ok(()) => {}
            // Lost a race against a concurrent retry with the same key.
            Err(StorageError::AlreadyExists(_)) => {
                if let Some(existing) = self.store.find_by_key(&key)? {
                    return Ok(existing);
                }
            }
            Err(e) => return Err(e.into()),
        }

        // The comment carries the account identifier, mirroring deposits.
        let comment = beneficiary.to_string();
        self.drive_send(&mut record, Some(&comment), SYNC_ATTEMPTS)
            .await?;
        Ok(record)
    }

    /// Withdraw directly from the custodial wallet (operator path).
    ///
    /// There is no internal balance to debit; the check is against the
    /// wallet's on-chain balance.
    pub async fn request_operator_withdrawal(
        &self,
        idempotency_key: Option<String>,
        destination: &str,
        amount: u64,
        notes: Option<String>,
    ) -> Result<WithdrawalRequest, EngineError> {
        let key = idempotency_key.unwrap_or_else(|| format!("operator-{}", Uuid::new_v4()));
        if let Some(existing) = self.store.find_by_key(&key)? {
            return Ok(existing);
        }

        let signer = self.signer()?;
        let destination = validate_request(destination, amount)?;
        let on_chain = self.chain.get_balance(&signer.address).await?;
        if on_chain < amount {
            return Err(EngineError::InsufficientFunds {
                available: on_chain as i64,
                requested: amount,
            });
        }

        let mut record = WithdrawalRequest::new_pending(
            key.clone(),
            None,
            destination.to_string(),
            amount,
            notes,
        );
        match self.store.insert(&record) {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(_)) => {
                if let Some(existing) = self.store.find_by_key(&key)? {
                    return Ok(existing);
                }
            }
            Err(e) => return Err(e.into()),
        }

        self.drive_send(&mut record, None, SYNC_ATTEMPTS).await?;
        Ok(record)
    }

    /// Retry requests stuck in Pending without a chain id.
    ///
    /// Bounded by both the attempt counter and a wall-clock age ceiling;
    /// past either bound the record is marked Failed. Funds were never
    /// debited for these, so no compensation is needed.
    pub async fn process_pending_withdrawals(&self) -> Result<(), EngineError> {
        let pending = self.store.list_unsent_pending()?;
        if pending.is_empty() {
            return Ok(());
        }
        tracing::info!(count = pending.len(), "retrying unsent pending withdrawals");

        for mut record in pending.into_iter().take(SWEEP_BATCH) {
            let age = Utc::now().signed_duration_since(record.created_at);
            if age > Duration::minutes(MAX_PENDING_AGE_MINUTES) {
                tracing::warn!(id = %record.id, age_minutes = age.num_minutes(), "withdrawal aged out");
                record.mark_failed(
                    "could not broadcast within the retry window; funds were never debited",
                );
                self.store.update(&record)?;
                continue;
            }
            if record.attempt_count >= MAX_ATTEMPTS {
                record.mark_failed("attempt ceiling reached; funds were never debited");
                self.store.update(&record)?;
                continue;
            }

            let comment = record.beneficiary_id.map(|id| id.to_string());
            self.drive_send(&mut record, comment.as_deref(), 1).await?;
        }
        Ok(())
    }

    /// Poll the status of Sent requests and finalize them.
    ///
    /// Chain acceptance advances to Confirmed. A post-broadcast rejection
    /// is the one path that credits the balance back, because the debit
    /// already happened at broadcast time.
    pub async fn update_pending_transactions(&self) -> Result<(), EngineError> {
        for mut record in self.store.list_sent()? {
            let Some(tx_id) = record.chain_tx_id.clone() else {
                continue;
            };
            match self.chain.get_transaction_status(&tx_id).await {
                Ok(TxStatus::Accepted) => {
                    record.mark_confirmed();
                    self.store.update(&record)?;
                    tracing::info!(id = %record.id, chain_tx_id = %tx_id, "withdrawal confirmed");
                }
                Ok(TxStatus::Failed) => {
                    record.mark_failed(
                        "chain rejected the transaction after broadcast; balance credited back",
                    );
                    self.store.update(&record)?;
                    if let Some(account) = record.beneficiary_id {
                        self.balances.credit_back(account, record.amount).await?;
                    }
                    tracing::warn!(
                        id = %record.id,
                        chain_tx_id = %tx_id,
                        amount = record.amount,
                        "withdrawal failed on chain, compensating credit applied"
                    );
                }
                Ok(TxStatus::NotFound) => {}
                Err(e) => {
                    tracing::warn!(id = %record.id, error = %e, "status probe failed");
                }
            }
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<WithdrawalRequest>, EngineError> {
        Ok(self.store.list()?)
    }

    pub fn get(&self, id: Uuid) -> Result<WithdrawalRequest, EngineError> {
        self.store
            .get(id)?
            .ok_or_else(|| EngineError::not_found(format!("withdrawal {id}")))
    }

    /// Drive up to `attempts` send attempts for a Pending record.
    ///
    /// On broadcast success the beneficiary balance is debited (exactly
    /// once) and the record moves to Sent. Transient failures are recorded
    /// and the record stays Pending for the sweep; permanent failures move
    /// it to Failed. Either way the balance stays untouched on failure.
    async fn drive_send(
        &self,
        record: &mut WithdrawalRequest,
        comment: Option<&str>,
        attempts: u32,
    ) -> Result<(), EngineError> {
        for attempt in 1..=attempts {
            match self.send_once(record, comment).await {
                Ok(chain_tx_id) => {
                    if let Some(account) = record.beneficiary_id {
                        self.balances.debit_after_send(account, record.amount).await?;
                    }
                    record.mark_sent(chain_tx_id.clone());
                    self.store.update(record)?;
                    tracing::info!(
                        id = %record.id,
                        chain_tx_id = %chain_tx_id,
                        amount = record.amount,
                        "withdrawal broadcast, balance debited"
                    );
                    return Ok(());
                }
                Err(SendError::Transient(detail)) => {
                    record.record_attempt(&detail);
                    self.store.update(record)?;
                    tracing::warn!(id = %record.id, attempt, detail = %detail, "send attempt failed");
                    if attempt < attempts {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
                Err(SendError::Permanent(detail)) => {
                    record.mark_failed(format!("{detail}; funds were never debited"));
                    self.store.update(record)?;
                    tracing::warn!(id = %record.id, detail = %detail, "withdrawal failed permanently");
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// One serialized fetch-seqno → build → sign → broadcast round.
    async fn send_once(
        &self,
        record: &WithdrawalRequest,
        comment: Option<&str>,
    ) -> Result<String, SendError> {
        let signer = self.signer().map_err(|e| SendError::Permanent(e.to_string()))?;
        let destination: WalletAddress = record
            .destination
            .parse()
            .map_err(|e: crate::wallet::AddressError| SendError::Permanent(e.to_string()))?;

        let _guard = self.send_lock.lock().await;
        let seqno = self
            .chain
            .get_sequence_number(&signer.address)
            .await
            .map_err(SendError::from)?;
        let message = build_transfer(
            &signer.keys,
            &signer.address,
            &destination,
            record.amount,
            seqno,
            comment,
        )
        .map_err(|e| SendError::Permanent(format!("failed to build transfer: {e}")))?;
        let tx_id = self.chain.broadcast(&message.boc).await?;
        Ok(tx_id)
    }
}

/// Internal send failure, split along the retry boundary.
enum SendError {
    Transient(String),
    Permanent(String),
}

impl From<ChainError> for SendError {
    fn from(e: ChainError) -> Self {
        if e.is_transient() {
            Self::Transient(e.to_string())
        } else {
            Self::Permanent(e.to_string())
        }
    }
}

fn validate_request(destination: &str, amount: u64) -> Result<WalletAddress, EngineError> {
    if amount == 0 {
        return Err(EngineError::validation("amount must be positive"));
    }
    destination
        .parse()
        .map_err(|e| EngineError::validation(format!("invalid destination address: {e}")))
}
