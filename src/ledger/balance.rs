// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-account balance operations.
//!
//! The settlement engine owns balances exclusively; the surrounding system
//! reads them and requests mutations through these operations. Every
//! operation runs under the account's lock (see [`AccountLocks`]), so a
//! sufficiency check and the adjustment it guards cannot interleave with
//! another mutator.

use std::sync::Arc;

use crate::error::EngineError;
use crate::ledger::AccountLocks;
use crate::models::{AccountBalance, AccountId, SubLedger};
use crate::storage::BalanceStore;

/// Referral commission, in percent, credited to the referrer on every
/// task-reward credit.
pub const REFERRAL_COMMISSION_PERCENT: u64 = 5;

/// Balance operation front-end over a [`BalanceStore`].
pub struct Balances {
    store: Arc<dyn BalanceStore>,
    locks: Arc<AccountLocks>,
}

impl Balances {
    pub fn new(store: Arc<dyn BalanceStore>, locks: Arc<AccountLocks>) -> Self {
        Self { store, locks }
    }

    pub fn store(&self) -> &Arc<dyn BalanceStore> {
        &self.store
    }

    /// Current balance; zero-valued for accounts never touched.
    pub fn get(&self, account: AccountId) -> Result<AccountBalance, EngineError> {
        Ok(self
            .store
            .get(account)?
            .unwrap_or_else(|| AccountBalance::zero(account)))
    }

    /// Debit spendable funds for a task budget.
    pub async fn debit_for_task(
        &self,
        account: AccountId,
        amount: u64,
    ) -> Result<AccountBalance, EngineError> {
        validate_amount(amount)?;
        let _guard = self.locks.acquire(account).await;
        let current = self.get(account)?;
        if current.active < amount as i64 {
            return Err(EngineError::InsufficientFunds {
                available: current.active,
                requested: amount,
            });
        }
        Ok(self
            .store
            .adjust(account, SubLedger::Active, -(amount as i64))?)
    }

    /// Credit a task reward, paying the referrer commission as a side
    /// effect.
    pub async fn credit_for_reward(
        &self,
        account: AccountId,
        amount: u64,
    ) -> Result<AccountBalance, EngineError> {
        validate_amount(amount)?;
        let credited = {
            let _guard = self.locks.acquire(account).await;
            self.store.adjust(account, SubLedger::Active, amount as i64)?
        };

        if let Some(referrer) = self.store.referrer_of(account)? {
            let commission = amount * REFERRAL_COMMISSION_PERCENT / 100;
            if commission > 0 {
                let _guard = self.locks.acquire(referrer).await;
                self.store
                    .adjust(referrer, SubLedger::ReferralEarned, commission as i64)?;
                tracing::info!(
                    account,
                    referrer,
                    commission,
                    "credited referral commission"
                );
            }
        }
        Ok(credited)
    }

    /// Credit an attributed deposit. Called by the deposit scanner only.
    pub async fn credit_deposit(
        &self,
        account: AccountId,
        amount: u64,
    ) -> Result<AccountBalance, EngineError> {
        validate_amount(amount)?;
        let _guard = self.locks.acquire(account).await;
        Ok(self.store.adjust(account, SubLedger::Active, amount as i64)?)
    }

    /// Debit after a successful broadcast. The amount was validated when
    /// the withdrawal was created; by the time this runs the money has
    /// already moved on chain, so the debit is unconditional.
    pub async fn debit_after_send(
        &self,
        account: AccountId,
        amount: u64,
    ) -> Result<AccountBalance, EngineError> {
        let _guard = self.locks.acquire(account).await;
        Ok(self
            .store
            .adjust(account, SubLedger::Active, -(amount as i64))?)
    }

    /// Compensating credit for a withdrawal the chain rejected after the
    /// debit already happened.
    pub async fn credit_back(
        &self,
        account: AccountId,
        amount: u64,
    ) -> Result<AccountBalance, EngineError> {
        let _guard = self.locks.acquire(account).await;
        Ok(self.store.adjust(account, SubLedger::Active, amount as i64)?)
    }

    /// Reserve spendable funds against a commitment.
    pub async fn move_to_escrow(
        &self,
        account: AccountId,
        amount: u64,
    ) -> Result<AccountBalance, EngineError> {
        validate_amount(amount)?;
        let _guard = self.locks.acquire(account).await;
        let current = self.get(account)?;
        if current.active < amount as i64 {
            return Err(EngineError::InsufficientFunds {
                available: current.active,
                requested: amount,
            });
        }
        self.store
            .adjust(account, SubLedger::Active, -(amount as i64))?;
        Ok(self.store.adjust(account, SubLedger::Escrow, amount as i64)?)
    }

    /// Release reserved funds back to the spendable balance.
    pub async fn release_from_escrow(
        &self,
        account: AccountId,
        amount: u64,
    ) -> Result<AccountBalance, EngineError> {
        validate_amount(amount)?;
        let _guard = self.locks.acquire(account).await;
        let current = self.get(account)?;
        if current.escrow < amount as i64 {
            return Err(EngineError::InsufficientFunds {
                available: current.escrow,
                requested: amount,
            });
        }
        self.store
            .adjust(account, SubLedger::Escrow, -(amount as i64))?;
        Ok(self.store.adjust(account, SubLedger::Active, amount as i64)?)
    }
}

fn validate_amount(amount: u64) -> Result<(), EngineError> {
    if amount == 0 {
        return Err(EngineError::validation("amount must be positive"));
    }
    Ok(())
}
