// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settlement daemon: builds the engine from the environment and runs the
//! periodic background sweeps until interrupted.

use std::env;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use settlement_engine::chain::HttpChainClient;
use settlement_engine::config::EngineConfig;
use settlement_engine::engine::{EngineStores, SettlementEngine};
use settlement_engine::poller::SettlementPoller;
use settlement_engine::storage::LedgerDb;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = EngineConfig::from_env();

    let data_dir = EngineConfig::data_dir();
    let db_path = Path::new(&data_dir).join("ledger.redb");
    let store = match LedgerDb::open(&db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(path = %db_path.display(), error = %e, "failed to open ledger database");
            std::process::exit(1);
        }
    };

    let chain = match HttpChainClient::new(&config.endpoints, config.api_key.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "failed to build chain client");
            std::process::exit(1);
        }
    };

    let engine = Arc::new(SettlementEngine::new(
        &config,
        EngineStores::from_single(store),
        chain,
    ));
    match engine.disabled_reason() {
        Some(reason) => tracing::warn!(reason, "running without payment features"),
        None => tracing::info!("settlement engine configured"),
    }

    let shutdown = CancellationToken::new();
    let poller = SettlementPoller::new(engine.clone());
    let poller_handle = tokio::spawn(poller.run(shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    tracing::info!("shutdown signal received");
    shutdown.cancel();
    let _ = poller_handle.await;
}

/// Structured logging: `pretty` for terminals, `json` for aggregation,
/// selected with `LOG_FORMAT`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
