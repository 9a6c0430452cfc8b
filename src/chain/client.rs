// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain client contract and error classification.
//!
//! Everything the engine reads from or writes to the blockchain goes
//! through [`ChainClient`]. Classifying failures as transient (worth a
//! retry against the same or an alternate backend) or permanent (retrying
//! cannot change the outcome) is part of this contract, not left to
//! callers: a broadcast timeout may mean the message actually landed, so
//! callers debit only after a confirmed success and leave retries to the
//! bounded sweeps.

use async_trait::async_trait;

use crate::wallet::WalletAddress;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Timeout, connection failure, 5xx or rate limit - retryable.
    #[error("transient chain error: {0}")]
    Transient(String),

    /// Hard rejection (malformed message, invalid signature) - not retried.
    #[error("chain rejected request: {0}")]
    Rejected(String),

    /// Every configured backend failed; carries the last error seen.
    #[error("all chain backends failed: {0}")]
    AllBackendsFailed(String),

    /// A backend answered with a body the client could not interpret.
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

impl ChainError {
    /// Whether a retry (possibly against another backend) can help.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::AllBackendsFailed(_))
    }
}

/// Status of a previously broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Not yet visible on chain; keep polling.
    NotFound,
    /// Included and executed successfully.
    Accepted,
    /// Included but the chain reports it failed.
    Failed,
}

/// One incoming transfer to the custodial wallet.
#[derive(Debug, Clone)]
pub struct IncomingTransfer {
    pub tx_id: String,
    pub source: String,
    /// Amount in smallest units.
    pub amount: u64,
    /// Attached comment, as raw bytes; transports are not uniform in how
    /// they expose this field, so decoding happens in the deposit scanner.
    pub comment: Vec<u8>,
}

/// Read/write access to the blockchain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Balance of `address` in smallest units.
    async fn get_balance(&self, address: &WalletAddress) -> Result<u64, ChainError>;

    /// Current wallet sequence number; 0 for an uninitialized account.
    async fn get_sequence_number(&self, address: &WalletAddress) -> Result<u32, ChainError>;

    /// Broadcast a signed bag-of-cells; returns the chain transaction id.
    async fn broadcast(&self, boc: &[u8]) -> Result<String, ChainError>;

    /// Probe the status of a broadcast transaction.
    async fn get_transaction_status(&self, tx_id: &str) -> Result<TxStatus, ChainError>;

    /// Most recent incoming transfers to `address`, newest first.
    async fn list_incoming_transfers(
        &self,
        address: &WalletAddress,
        limit: usize,
    ) -> Result<Vec<IncomingTransfer>, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ChainError::Transient("timeout".into()).is_transient());
        assert!(ChainError::AllBackendsFailed("5xx".into()).is_transient());
        assert!(!ChainError::Rejected("bad signature".into()).is_transient());
        assert!(!ChainError::InvalidResponse("not json".into()).is_transient());
    }
}
