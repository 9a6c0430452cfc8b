// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scriptable in-process chain double for tests.
//!
//! Models the wallet contract's ordering rule: a broadcast is accepted only
//! if the sequence number was re-fetched after the previous accepted
//! broadcast. Racing callers that reuse a stale fetch get the same
//! sequence-number conflict the real chain would produce, and the conflict
//! is counted so tests can assert it never happens under the engine's
//! serialization.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{ChainClient, ChainError, IncomingTransfer, TxStatus};
use crate::wallet::WalletAddress;

#[derive(Default)]
struct State {
    seqno: u32,
    wallet_balance: u64,
    fetched_since_last_broadcast: bool,
    scripted_broadcast_errors: VecDeque<ChainError>,
    scripted_tx_ids: VecDeque<String>,
    accepted_seqnos: Vec<u32>,
    broadcast_bocs: Vec<Vec<u8>>,
    conflicts: u32,
    statuses: HashMap<String, TxStatus>,
    incoming: Vec<IncomingTransfer>,
}

#[derive(Default)]
pub struct FakeChainClient {
    state: Mutex<State>,
}

impl FakeChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake chain mutex poisoned")
    }

    pub fn set_seqno(&self, seqno: u32) {
        self.lock().seqno = seqno;
    }

    pub fn set_wallet_balance(&self, balance: u64) {
        self.lock().wallet_balance = balance;
    }

    /// Script the tx id returned by the next successful broadcast.
    pub fn push_tx_id(&self, id: &str) {
        self.lock().scripted_tx_ids.push_back(id.to_string());
    }

    /// Script a failure for the next broadcast attempt.
    pub fn push_broadcast_error(&self, error: ChainError) {
        self.lock().scripted_broadcast_errors.push_back(error);
    }

    pub fn set_status(&self, tx_id: &str, status: TxStatus) {
        self.lock().statuses.insert(tx_id.to_string(), status);
    }

    pub fn push_incoming(&self, transfer: IncomingTransfer) {
        self.lock().incoming.push(transfer);
    }

    /// Sequence numbers of accepted broadcasts, in order.
    pub fn accepted_seqnos(&self) -> Vec<u32> {
        self.lock().accepted_seqnos.clone()
    }

    pub fn broadcast_count(&self) -> usize {
        self.lock().broadcast_bocs.len()
    }

    /// Broadcasts rejected for sequence-number conflicts.
    pub fn conflicts(&self) -> u32 {
        self.lock().conflicts
    }
}

#[async_trait]
impl ChainClient for FakeChainClient {
    async fn get_balance(&self, _address: &WalletAddress) -> Result<u64, ChainError> {
        Ok(self.lock().wallet_balance)
    }

    async fn get_sequence_number(&self, _address: &WalletAddress) -> Result<u32, ChainError> {
        let mut state = self.lock();
        state.fetched_since_last_broadcast = true;
        Ok(state.seqno)
    }

    async fn broadcast(&self, boc: &[u8]) -> Result<String, ChainError> {
        let mut state = self.lock();
        state.broadcast_bocs.push(boc.to_vec());

        if let Some(error) = state.scripted_broadcast_errors.pop_front() {
            return Err(error);
        }
        if !state.fetched_since_last_broadcast {
            state.conflicts += 1;
            return Err(ChainError::Rejected("sequence number conflict".to_string()));
        }

        let seqno = state.seqno;
        state.accepted_seqnos.push(seqno);
        state.fetched_since_last_broadcast = false;
        state.seqno += 1;

        let id = state
            .scripted_tx_ids
            .pop_front()
            .unwrap_or_else(|| format!("tx-{seqno}"));
        state.statuses.insert(id.clone(), TxStatus::NotFound);
        Ok(id)
    }

    async fn get_transaction_status(&self, tx_id: &str) -> Result<TxStatus, ChainError> {
        Ok(self
            .lock()
            .statuses
            .get(tx_id)
            .copied()
            .unwrap_or(TxStatus::NotFound))
    }

    async fn list_incoming_transfers(
        &self,
        _address: &WalletAddress,
        limit: usize,
    ) -> Result<Vec<IncomingTransfer>, ChainError> {
        let state = self.lock();
        Ok(state.incoming.iter().take(limit).cloned().collect())
    }
}
