// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller-facing error taxonomy for the settlement engine.
//!
//! Validation and configuration errors are returned synchronously and create
//! no ledger state. Transient chain errors are absorbed by the background
//! sweeps after the initial synchronous attempt; anything that may have moved
//! funds is additionally preserved on the withdrawal record as
//! `error_detail` for manual audit.

use crate::chain::ChainError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Payment features are disabled because configuration is missing.
    #[error("settlement engine is not configured: {0}")]
    NotConfigured(String),

    /// The recovery phrase failed validation.
    #[error("invalid recovery phrase: {0}")]
    InvalidPhrase(String),

    /// Synchronous request validation failed; no state was created.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The beneficiary's active balance (or the custodial wallet's on-chain
    /// balance for operator withdrawals) does not cover the amount.
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: u64 },

    /// A referenced record or account does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The chain rejected or failed the operation.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// The ledger store failed.
    #[error("storage error: {0}")]
    Store(#[from] StorageError),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_amounts() {
        let err = EngineError::InsufficientFunds {
            available: 1_000,
            requested: 2_000,
        };
        let text = err.to_string();
        assert!(text.contains("1000"));
        assert!(text.contains("2000"));
    }
}
