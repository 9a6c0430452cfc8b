// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain integration module.
//!
//! This module provides functionality for:
//! - Querying the custodial wallet balance and sequence number
//! - Building and signing transfer messages (cell codec)
//! - Broadcasting signed messages and probing their status
//! - Listing incoming transfers for deposit attribution

pub mod cell;
pub mod client;
#[cfg(test)]
pub mod fake;
pub mod http;
pub mod transfer;

pub use client::{ChainClient, ChainError, IncomingTransfer, TxStatus};
pub use http::HttpChainClient;
pub use transfer::{build_transfer, SignedMessage};
