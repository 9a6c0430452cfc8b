// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The settlement engine: one explicitly constructed value wiring the
//! withdrawal ledger, deposit scanner and reconciler over shared stores
//! and a chain client.
//!
//! Built once at startup from validated configuration and passed by
//! handle to whatever needs it. Missing or invalid payment configuration
//! does not fail construction: the engine comes up disabled, the host
//! keeps running, and every settlement operation reports the
//! configuration problem.

use std::sync::Arc;

use uuid::Uuid;

use crate::chain::ChainClient;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ledger::withdrawals::SignerContext;
use crate::ledger::{
    AccountLocks, BalanceReconciler, Balances, DepositScanner, ReconcileReport, ScanSummary,
    WithdrawalLedger,
};
use crate::models::{AccountId, DepositRecord, WithdrawalRequest};
use crate::storage::{BalanceStore, BudgetSource, DepositStore, WithdrawalStore};
use crate::wallet::{derive_keys, WalletAddress};

/// Store handles consumed by the engine.
#[derive(Clone)]
pub struct EngineStores {
    pub withdrawals: Arc<dyn WithdrawalStore>,
    pub deposits: Arc<dyn DepositStore>,
    pub balances: Arc<dyn BalanceStore>,
    pub budgets: Arc<dyn BudgetSource>,
}

impl EngineStores {
    /// Bundle a single store implementing every trait (the in-crate
    /// implementations both do).
    pub fn from_single<S>(store: Arc<S>) -> Self
    where
        S: WithdrawalStore + DepositStore + BalanceStore + BudgetSource + 'static,
    {
        Self {
            withdrawals: store.clone(),
            deposits: store.clone(),
            balances: store.clone(),
            budgets: store,
        }
    }
}

pub struct SettlementEngine {
    wallet_address: Option<WalletAddress>,
    chain: Arc<dyn ChainClient>,
    balances: Arc<Balances>,
    deposits: Arc<dyn DepositStore>,
    withdrawals: WithdrawalLedger,
    scanner: DepositScanner,
    reconciler: BalanceReconciler,
    disabled_reason: Option<String>,
}

impl SettlementEngine {
    /// Wire an engine from configuration, stores and a chain client.
    ///
    /// Key derivation failures and missing settings disable payments but
    /// never fail construction; the reason is logged once here and
    /// attached to every rejected operation afterwards.
    pub fn new(
        config: &EngineConfig,
        stores: EngineStores,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        let mut disabled_reason = config.wallet_status().map(|missing| {
            format!("payment configuration incomplete: missing {missing}")
        });

        let signer = match (&config.recovery_phrase, &config.wallet_address) {
            (Some(phrase), Some(address)) => match derive_keys(phrase) {
                Ok(keys) => Some(Arc::new(SignerContext {
                    keys,
                    address: *address,
                })),
                Err(e) => {
                    disabled_reason = Some(format!("recovery phrase rejected: {e}"));
                    None
                }
            },
            _ => None,
        };

        if let Some(reason) = &disabled_reason {
            tracing::warn!(reason = %reason, "settlement engine starting disabled");
        }

        let locks = Arc::new(AccountLocks::new());
        let balances = Arc::new(Balances::new(stores.balances.clone(), locks.clone()));

        let withdrawals = WithdrawalLedger::new(
            stores.withdrawals.clone(),
            balances.clone(),
            chain.clone(),
            signer,
        );
        let scanner = DepositScanner::new(
            stores.deposits.clone(),
            balances.clone(),
            chain.clone(),
            config.wallet_address,
        );
        let reconciler = BalanceReconciler::new(
            stores.deposits.clone(),
            stores.withdrawals,
            stores.budgets,
            balances.clone(),
            locks,
        );

        Self {
            wallet_address: config.wallet_address,
            chain,
            balances,
            deposits: stores.deposits,
            withdrawals,
            scanner,
            reconciler,
            disabled_reason,
        }
    }

    /// Why payments are disabled, if they are.
    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled_reason.as_deref()
    }

    /// Balance operations (debit-for-task, credit-for-reward, escrow).
    pub fn balances(&self) -> &Balances {
        &self.balances
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    pub async fn request_withdrawal(
        &self,
        idempotency_key: Option<String>,
        beneficiary: AccountId,
        destination: &str,
        amount: u64,
    ) -> Result<WithdrawalRequest, EngineError> {
        self.withdrawals
            .request_withdrawal(idempotency_key, beneficiary, destination, amount)
            .await
    }

    pub async fn request_operator_withdrawal(
        &self,
        idempotency_key: Option<String>,
        destination: &str,
        amount: u64,
        notes: Option<String>,
    ) -> Result<WithdrawalRequest, EngineError> {
        self.withdrawals
            .request_operator_withdrawal(idempotency_key, destination, amount, notes)
            .await
    }

    /// Retry sweep for unsent pending withdrawals.
    pub async fn process_pending_withdrawals(&self) -> Result<(), EngineError> {
        self.withdrawals.process_pending_withdrawals().await
    }

    /// Status sweep for sent withdrawals.
    pub async fn update_pending_transactions(&self) -> Result<(), EngineError> {
        self.withdrawals.update_pending_transactions().await
    }

    pub fn list_withdrawals(&self) -> Result<Vec<WithdrawalRequest>, EngineError> {
        self.withdrawals.list()
    }

    pub fn get_withdrawal(&self, id: Uuid) -> Result<WithdrawalRequest, EngineError> {
        self.withdrawals.get(id)
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Scan the custodial wallet for new incoming deposits.
    pub async fn scan_deposits(&self) -> Result<ScanSummary, EngineError> {
        self.scanner.scan().await
    }

    /// Credit unmatched deposits whose account has since registered.
    pub async fn resolve_unmatched_deposits(&self) -> Result<usize, EngineError> {
        self.scanner.resolve_unmatched().await
    }

    pub fn list_account_deposits(
        &self,
        account: AccountId,
    ) -> Result<Vec<DepositRecord>, EngineError> {
        Ok(self.deposits.list_by_account(account)?)
    }

    // =========================================================================
    // Balances and reconciliation
    // =========================================================================

    /// On-chain balance of the custodial wallet.
    pub async fn get_wallet_balance(&self) -> Result<u64, EngineError> {
        let address = self.wallet_address.as_ref().ok_or_else(|| {
            EngineError::NotConfigured("custodial wallet address is not configured".to_string())
        })?;
        Ok(self.chain.get_balance(address).await?)
    }

    /// Recompute an account balance and correct drift.
    pub async fn reconcile(&self, account: AccountId) -> Result<ReconcileReport, EngineError> {
        self.reconciler.reconcile(account).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::client::IncomingTransfer;
    use crate::chain::fake::FakeChainClient;
    use crate::models::WithdrawalStatus;
    use crate::storage::MemoryStore;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon art";
    const ACCOUNT: AccountId = 555_555_555;

    fn config(phrase: Option<&str>) -> EngineConfig {
        EngineConfig {
            recovery_phrase: phrase.map(str::to_string),
            wallet_address: Some(WalletAddress::new(0, [0x11; 32])),
            api_key: None,
            endpoints: vec!["https://tonapi.io".to_string()],
        }
    }

    fn engine_with(phrase: Option<&str>) -> (SettlementEngine, Arc<MemoryStore>, Arc<FakeChainClient>) {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(FakeChainClient::new());
        let engine = SettlementEngine::new(
            &config(phrase),
            EngineStores::from_single(store.clone()),
            chain.clone(),
        );
        (engine, store, chain)
    }

    fn dest() -> String {
        WalletAddress::new(0, [0x22; 32]).to_string()
    }

    #[tokio::test]
    async fn deposit_then_withdrawal_end_to_end() {
        let (engine, store, chain) = engine_with(Some(PHRASE));
        assert!(engine.disabled_reason().is_none());
        store.register_account(ACCOUNT, None);

        // Deposit d1: 10 tokens with the account identifier in the comment.
        chain.push_incoming(IncomingTransfer {
            tx_id: "d1".into(),
            source: "0:src".into(),
            amount: 10_000_000_000,
            comment: b"tg:555555555".to_vec(),
        });
        let summary = engine.scan_deposits().await.unwrap();
        assert_eq!(summary.credited, 1);
        assert_eq!(engine.balances().get(ACCOUNT).unwrap().active, 10_000_000_000);

        // Withdraw 4 tokens under key "k1"; the fake reports seqno 5 and
        // returns tx id "abc".
        chain.set_seqno(5);
        chain.push_tx_id("abc");
        let record = engine
            .request_withdrawal(Some("k1".into()), ACCOUNT, &dest(), 4_000_000_000)
            .await
            .unwrap();
        assert_eq!(record.status, WithdrawalStatus::Sent);
        assert_eq!(record.chain_tx_id.as_deref(), Some("abc"));
        assert_eq!(engine.balances().get(ACCOUNT).unwrap().active, 6_000_000_000);

        // Replaying the same key changes nothing.
        let replay = engine
            .request_withdrawal(Some("k1".into()), ACCOUNT, &dest(), 4_000_000_000)
            .await
            .unwrap();
        assert_eq!(replay.id, record.id);
        assert_eq!(engine.balances().get(ACCOUNT).unwrap().active, 6_000_000_000);

        // The incrementally maintained balance matches the recomputation.
        let report = engine.reconcile(ACCOUNT).await.unwrap();
        assert_eq!(report.delta, 0);
        assert_eq!(report.new_balance, 6_000_000_000);

        // Audit views see both sides.
        assert_eq!(engine.list_withdrawals().unwrap().len(), 1);
        assert_eq!(engine.list_account_deposits(ACCOUNT).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_phrase_disables_payments_but_not_scanning() {
        let (engine, store, chain) = engine_with(None);
        let reason = engine.disabled_reason().unwrap();
        assert!(reason.contains("WALLET_RECOVERY_PHRASE"));

        let result = engine
            .request_withdrawal(Some("k".into()), ACCOUNT, &dest(), 100)
            .await;
        assert!(matches!(result, Err(EngineError::NotConfigured(_))));

        // Deposit scanning only needs the wallet address.
        store.register_account(ACCOUNT, None);
        chain.push_incoming(IncomingTransfer {
            tx_id: "d1".into(),
            source: "0:src".into(),
            amount: 1_000,
            comment: b"tg:555555555".to_vec(),
        });
        assert_eq!(engine.scan_deposits().await.unwrap().credited, 1);
    }

    #[tokio::test]
    async fn invalid_phrase_disables_with_reason() {
        let (engine, _, _) = engine_with(Some("garbage words that are not a phrase"));
        let reason = engine.disabled_reason().unwrap();
        assert!(reason.contains("recovery phrase rejected"));

        let result = engine
            .request_withdrawal(Some("k".into()), ACCOUNT, &dest(), 100)
            .await;
        assert!(matches!(result, Err(EngineError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn wallet_balance_comes_from_chain() {
        let (engine, _, chain) = engine_with(Some(PHRASE));
        chain.set_wallet_balance(123_456);
        assert_eq!(engine.get_wallet_balance().await.unwrap(), 123_456);
    }

    #[tokio::test]
    async fn reconcile_zero_delta_through_normal_flow() {
        let (engine, store, chain) = engine_with(Some(PHRASE));
        store.register_account(ACCOUNT, None);
        chain.push_incoming(IncomingTransfer {
            tx_id: "d1".into(),
            source: "0:src".into(),
            amount: 5_000,
            comment: b"tg:555555555".to_vec(),
        });
        engine.scan_deposits().await.unwrap();
        engine
            .request_withdrawal(Some("w".into()), ACCOUNT, &dest(), 2_000)
            .await
            .unwrap();

        let report = engine.reconcile(ACCOUNT).await.unwrap();
        assert_eq!(report.delta, 0);
        assert_eq!(report.new_balance, 3_000);
    }
}
