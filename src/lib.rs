// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settlement Engine - Custodial TON Settlement Service
//!
//! Core settlement engine for a micro-task marketplace: moves value out of
//! a custodial wallet, attributes incoming deposits to ledger accounts,
//! and keeps the internal ledger consistent with the chain it does not
//! control.
//!
//! ## Modules
//!
//! - `engine` - the wired engine value and its caller-facing API
//! - `wallet` - recovery-phrase key derivation and address handling
//! - `chain` - cell codec, transfer builder, chain client with fallback
//! - `ledger` - withdrawal state machine, deposit scanner, reconciler
//! - `storage` - store traits plus in-memory and redb implementations
//! - `poller` - periodic background sweeps

pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod models;
pub mod poller;
pub mod storage;
pub mod wallet;
