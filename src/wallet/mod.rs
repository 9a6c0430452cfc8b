// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custodial wallet key management.
//!
//! - `mnemonic` - recovery-phrase validation and Ed25519 key derivation
//! - `address` - on-chain address parsing and formatting

mod address;
mod mnemonic;

pub use address::{AddressError, WalletAddress};
pub use mnemonic::{derive_keys, PhraseError, WalletKeys};
