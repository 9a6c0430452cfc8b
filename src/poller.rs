// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Settlement Poller
//!
//! Background task driving the engine's periodic sweeps:
//!
//! 1. **Deposit scan** (default 60 s): pick up new incoming transfers and
//!    credit what can be attributed, then retry unmatched records whose
//!    accounts registered late.
//! 2. **Withdrawal sweeps** (default 30 s): retry unsent pending
//!    withdrawals and poll the chain status of sent ones.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown; spawn
//! with `tokio::spawn(poller.run(shutdown.clone()))`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::SettlementEngine;
use crate::error::EngineError;

/// Default interval between deposit scans.
const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(60);

/// Default interval between withdrawal sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Background poller over a shared [`SettlementEngine`].
pub struct SettlementPoller {
    engine: Arc<SettlementEngine>,
    scan_interval: Duration,
    sweep_interval: Duration,
}

impl SettlementPoller {
    pub fn new(engine: Arc<SettlementEngine>) -> Self {
        Self {
            engine,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    #[cfg(test)]
    fn with_intervals(engine: Arc<SettlementEngine>, scan: Duration, sweep: Duration) -> Self {
        Self {
            engine,
            scan_interval: scan,
            sweep_interval: sweep,
        }
    }

    /// Run the poller loop until the cancellation token is triggered.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            scan_secs = self.scan_interval.as_secs(),
            sweep_secs = self.sweep_interval.as_secs(),
            "settlement poller starting"
        );

        let mut scan = tokio::time::interval(self.scan_interval);
        let mut sweep = tokio::time::interval(self.sweep_interval);

        loop {
            tokio::select! {
                _ = scan.tick() => self.scan_step().await,
                _ = sweep.tick() => self.sweep_step().await,
                _ = shutdown.cancelled() => {
                    info!("settlement poller shutting down");
                    return;
                }
            }
        }
    }

    async fn scan_step(&self) {
        if let Err(e) = self.engine.scan_deposits().await {
            log_step("deposit scan", &e);
            return;
        }
        if let Err(e) = self.engine.resolve_unmatched_deposits().await {
            log_step("unmatched resolution", &e);
        }
    }

    async fn sweep_step(&self) {
        if let Err(e) = self.engine.process_pending_withdrawals().await {
            log_step("pending withdrawal sweep", &e);
        }
        if let Err(e) = self.engine.update_pending_transactions().await {
            log_step("transaction status sweep", &e);
        }
    }
}

/// A disabled engine is expected and already reported at startup; other
/// failures are worth a warning each time.
fn log_step(step: &str, error: &EngineError) {
    match error {
        EngineError::NotConfigured(_) => tracing::debug!(step, error = %error, "sweep skipped"),
        _ => warn!(step, error = %error, "sweep failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::client::IncomingTransfer;
    use crate::chain::fake::FakeChainClient;
    use crate::config::EngineConfig;
    use crate::engine::EngineStores;
    use crate::storage::MemoryStore;
    use crate::wallet::WalletAddress;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon art";

    #[tokio::test(start_paused = true)]
    async fn poller_credits_deposits_and_shuts_down() {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(FakeChainClient::new());
        store.register_account(555_555_555, None);
        chain.push_incoming(IncomingTransfer {
            tx_id: "d1".into(),
            source: "0:src".into(),
            amount: 2_000_000_000,
            comment: b"tg:555555555".to_vec(),
        });

        let config = EngineConfig {
            recovery_phrase: Some(PHRASE.to_string()),
            wallet_address: Some(WalletAddress::new(0, [0x11; 32])),
            api_key: None,
            endpoints: vec!["https://tonapi.io".to_string()],
        };
        let engine = Arc::new(crate::engine::SettlementEngine::new(
            &config,
            EngineStores::from_single(store.clone()),
            chain,
        ));

        let poller = SettlementPoller::with_intervals(
            engine.clone(),
            Duration::from_millis(10),
            Duration::from_millis(10),
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(poller.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(
            engine.balances().get(555_555_555).unwrap().active,
            2_000_000_000
        );
    }
}
