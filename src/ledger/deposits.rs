// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Incoming-transfer scanner and deposit attribution.
//!
//! Each observed transfer becomes exactly one [`DepositRecord`], keyed by
//! chain transaction id; the existence check up front is what makes
//! re-scanning the same window safe. A record whose identifier resolves to
//! a registered account is credited synchronously; otherwise it stays
//! Unmatched and a later [`DepositScanner::resolve_unmatched`] pass picks
//! it up, because accounts may register after their deposit arrives.

use std::sync::Arc;

use crate::chain::ChainClient;
use crate::error::EngineError;
use crate::ledger::comment::extract_identifier;
use crate::ledger::Balances;
use crate::models::DepositRecord;
use crate::storage::{BalanceStore, DepositStore};
use crate::wallet::WalletAddress;

/// How many recent transactions each scan fetches.
const SCAN_WINDOW: usize = 100;

/// Outcome counters for one scan pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// New records persisted this pass.
    pub observed: usize,
    /// Records credited to an account this pass.
    pub credited: usize,
}

/// Deposit scanner over the custodial wallet's incoming transfers.
pub struct DepositScanner {
    deposits: Arc<dyn DepositStore>,
    balances: Arc<Balances>,
    chain: Arc<dyn ChainClient>,
    wallet: Option<WalletAddress>,
}

impl DepositScanner {
    pub fn new(
        deposits: Arc<dyn DepositStore>,
        balances: Arc<Balances>,
        chain: Arc<dyn ChainClient>,
        wallet: Option<WalletAddress>,
    ) -> Self {
        Self {
            deposits,
            balances,
            chain,
            wallet,
        }
    }

    fn wallet(&self) -> Result<&WalletAddress, EngineError> {
        self.wallet.as_ref().ok_or_else(|| {
            EngineError::NotConfigured("custodial wallet address is not configured".to_string())
        })
    }

    /// Scan recent incoming transfers and credit what can be attributed.
    pub async fn scan(&self) -> Result<ScanSummary, EngineError> {
        let wallet = self.wallet()?;
        let transfers = self
            .chain
            .list_incoming_transfers(wallet, SCAN_WINDOW)
            .await?;

        let mut summary = ScanSummary::default();
        for transfer in transfers {
            if self.deposits.contains(&transfer.tx_id)? {
                continue;
            }

            let identifier = extract_identifier(&transfer.comment).found();
            let mut record = DepositRecord::new_unmatched(
                transfer.tx_id.clone(),
                transfer.source.clone(),
                transfer.amount,
                identifier,
            );

            // Persist before crediting: a crash between the two leaves an
            // Unmatched record the resolve pass can finish.
            self.deposits.insert(&record)?;
            summary.observed += 1;

            match identifier {
                Some(id) => match self.balances.store().find_account_by_identifier(id)? {
                    Some(account) => {
                        self.balances.credit_deposit(account, record.amount).await?;
                        record.mark_credited(account);
                        self.deposits.update(&record)?;
                        summary.credited += 1;
                        tracing::info!(
                            chain_tx_id = %record.chain_tx_id,
                            account,
                            amount = record.amount,
                            "deposit credited"
                        );
                    }
                    None => {
                        tracing::warn!(
                            chain_tx_id = %record.chain_tx_id,
                            identifier = id,
                            "deposit identifier does not resolve to a known account"
                        );
                    }
                },
                None => {
                    tracing::warn!(
                        chain_tx_id = %record.chain_tx_id,
                        "no identifier found in deposit comment"
                    );
                }
            }
        }

        if summary.observed > 0 {
            tracing::info!(
                observed = summary.observed,
                credited = summary.credited,
                "deposit scan complete"
            );
        }
        Ok(summary)
    }

    /// Credit Unmatched records whose identifier has since become
    /// resolvable. Idempotent: records credit at most once.
    pub async fn resolve_unmatched(&self) -> Result<usize, EngineError> {
        let mut credited = 0;
        for mut record in self.deposits.list_unmatched()? {
            let Some(identifier) = record.extracted_identifier else {
                continue;
            };
            let Some(account) = self
                .balances
                .store()
                .find_account_by_identifier(identifier)?
            else {
                continue;
            };
            self.balances.credit_deposit(account, record.amount).await?;
            record.mark_credited(account);
            self.deposits.update(&record)?;
            credited += 1;
            tracing::info!(
                chain_tx_id = %record.chain_tx_id,
                account,
                amount = record.amount,
                "late-registered deposit credited"
            );
        }
        Ok(credited)
    }
}
