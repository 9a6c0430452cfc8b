// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and the engine
//! configuration loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `WALLET_RECOVERY_PHRASE` | 24-word recovery phrase of the custodial wallet | Required for payments |
//! | `WALLET_ADDRESS` | On-chain address of the custodial wallet | Required for payments |
//! | `CHAIN_API_KEY` | Bearer token for the chain-query backends | Optional |
//! | `CHAIN_API_ENDPOINTS` | Comma-separated ordered list of backend base URLs | Public endpoints |
//! | `DATA_DIR` | Root directory for the embedded ledger database | `/data` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |
//!
//! A missing recovery phrase, wallet address, or endpoint list degrades the
//! engine into a disabled state rather than failing startup: the host keeps
//! running without payment features and every settlement operation returns a
//! configuration error.

use crate::wallet::WalletAddress;

/// Environment variable name for the custodial wallet recovery phrase.
pub const RECOVERY_PHRASE_ENV: &str = "WALLET_RECOVERY_PHRASE";

/// Environment variable name for the custodial wallet address.
pub const WALLET_ADDRESS_ENV: &str = "WALLET_ADDRESS";

/// Environment variable name for the chain backend API key.
pub const CHAIN_API_KEY_ENV: &str = "CHAIN_API_KEY";

/// Environment variable name for the ordered chain backend list.
pub const CHAIN_ENDPOINTS_ENV: &str = "CHAIN_API_ENDPOINTS";

/// Environment variable name for the ledger database directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Default ledger database directory.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Default ordered list of public chain-query backends.
pub const DEFAULT_CHAIN_ENDPOINTS: &[&str] = &[
    "https://tonapi.io",
    "https://toncenter.com",
];

/// Engine configuration loaded from the environment.
///
/// All payment-critical fields are optional so that the surrounding system
/// can start without them; [`EngineConfig::wallet_status`] reports what is
/// missing.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 24-word recovery phrase. Quotes and surrounding whitespace are
    /// stripped (deployment tooling tends to re-quote environment values).
    pub recovery_phrase: Option<String>,
    /// Custodial wallet address, parsed and normalized.
    pub wallet_address: Option<WalletAddress>,
    /// Bearer token for the chain backends.
    pub api_key: Option<String>,
    /// Ordered backend base URLs; tried in sequence on transient failure.
    pub endpoints: Vec<String>,
}

impl EngineConfig {
    /// Load configuration from the process environment.
    ///
    /// Never fails: missing or malformed payment settings leave the
    /// corresponding fields `None` and are reported once via `tracing`.
    pub fn from_env() -> Self {
        let recovery_phrase = env_optional(RECOVERY_PHRASE_ENV).map(|raw| strip_quotes(&raw));
        if recovery_phrase.is_none() {
            tracing::warn!(
                "{} is not set; outbound payments are disabled",
                RECOVERY_PHRASE_ENV
            );
        }

        let wallet_address = match env_optional(WALLET_ADDRESS_ENV) {
            Some(raw) => match raw.parse::<WalletAddress>() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::warn!(error = %e, "{} is malformed; payments disabled", WALLET_ADDRESS_ENV);
                    None
                }
            },
            None => {
                tracing::warn!(
                    "{} is not set; deposit scanning is disabled",
                    WALLET_ADDRESS_ENV
                );
                None
            }
        };

        let api_key = env_optional(CHAIN_API_KEY_ENV);

        let endpoints = match env_optional(CHAIN_ENDPOINTS_ENV) {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_CHAIN_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        Self {
            recovery_phrase,
            wallet_address,
            api_key,
            endpoints,
        }
    }

    /// Directory for the embedded ledger database.
    pub fn data_dir() -> String {
        env_or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)
    }

    /// Human-readable description of missing payment configuration, or
    /// `None` when the engine is fully configured.
    pub fn wallet_status(&self) -> Option<String> {
        let mut missing = Vec::new();
        if self.recovery_phrase.is_none() {
            missing.push(RECOVERY_PHRASE_ENV);
        }
        if self.wallet_address.is_none() {
            missing.push(WALLET_ADDRESS_ENV);
        }
        if self.endpoints.is_empty() {
            missing.push(CHAIN_ENDPOINTS_ENV);
        }
        if missing.is_empty() {
            None
        } else {
            Some(missing.join(", "))
        }
    }
}

/// Strip one or more layers of matching quotes around a value.
fn strip_quotes(raw: &str) -> String {
    let mut s = raw.trim();
    while (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        s = s[1..s.len() - 1].trim();
    }
    s.to_string()
}

fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_quotes_handles_nested_and_mixed() {
        assert_eq!(strip_quotes("\"abandon ability\""), "abandon ability");
        assert_eq!(strip_quotes("'\"word list\"'"), "word list");
        assert_eq!(strip_quotes("  plain  "), "plain");
        assert_eq!(strip_quotes("\"\""), "");
    }

    #[test]
    fn default_endpoints_are_ordered() {
        assert_eq!(DEFAULT_CHAIN_ENDPOINTS[0], "https://tonapi.io");
        assert_eq!(DEFAULT_CHAIN_ENDPOINTS.len(), 2);
    }
}
