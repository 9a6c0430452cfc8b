// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound transfer construction and signing.
//!
//! A transfer is three nested layers, built bottom-up:
//!
//! 1. an internal transfer message (destination, value, optional text
//!    comment in a child cell tagged with a zero opcode),
//! 2. the wallet-contract body carrying the subwallet tag, expiry, sequence
//!    number and send mode, signed over its representation hash,
//! 3. an external-message envelope addressed to the custodial wallet
//!    itself, with the signature prepended to the body.
//!
//! [`build_transfer`] is a pure function of its inputs - no clock, no I/O -
//! so identical inputs always produce identical bytes.

use crate::chain::cell::{encode_boc, Cell, CellBuilder, CellError};
use crate::wallet::{WalletAddress, WalletKeys};

/// Subwallet tag baked into v4 wallet contracts.
const SUBWALLET_ID: u32 = 698_983_191;

/// Expiry field of the signed body. Sequence-number ordering is the replay
/// protection, so the expiry is pinned to keep the builder deterministic.
const NEVER_EXPIRES: u32 = u32::MAX;

/// Send mode: pay forwarding fees separately, ignore action errors.
const SEND_MODE: u8 = 3;

/// Opcode tag marking a plain-text transfer comment.
const COMMENT_OPCODE: u32 = 0;

/// A fully signed external message, ready to broadcast.
#[derive(Debug)]
pub struct SignedMessage {
    /// Bag-of-cells encoding of the external envelope.
    pub boc: Vec<u8>,
    /// Representation hash of the signed wallet body.
    pub body_hash: [u8; 32],
    /// Detached signature over `body_hash`.
    pub signature: [u8; 64],
}

impl SignedMessage {
    /// Base64 form expected by broadcast endpoints.
    pub fn boc_base64(&self) -> String {
        use base64ct::{Base64, Encoding};
        Base64::encode_string(&self.boc)
    }
}

/// Build and sign a transfer of `amount` smallest units to `destination`,
/// serialized under `seqno`.
pub fn build_transfer(
    keys: &WalletKeys,
    wallet: &WalletAddress,
    destination: &WalletAddress,
    amount: u64,
    seqno: u32,
    comment: Option<&str>,
) -> Result<SignedMessage, CellError> {
    let internal = internal_message(destination, amount, comment)?;

    let body = CellBuilder::new()
        .store_uint(SUBWALLET_ID as u64, 32)
        .store_uint(NEVER_EXPIRES as u64, 32)
        .store_uint(seqno as u64, 32)
        .store_uint(0, 8) // op: simple send
        .store_uint(SEND_MODE as u64, 8)
        .store_ref(internal)
        .finish()?;

    let body_hash = body.repr_hash();
    let signature = keys.sign(&body_hash);

    let signed_body = CellBuilder::new()
        .store_bytes(&signature)
        .store_cell(&body)
        .finish()?;

    let envelope = CellBuilder::new()
        .store_uint(0b10, 2) // ext_in_msg_info
        .store_address(None) // external source
        .store_address(Some(wallet))
        .store_coins(0) // import fee
        .store_bit(false) // no state init
        .store_bit(true) // body in a child cell
        .store_ref(signed_body)
        .finish()?;

    Ok(SignedMessage {
        boc: encode_boc(&envelope),
        body_hash,
        signature,
    })
}

/// Internal transfer message: destination, value, fee fields, and the
/// optional comment payload.
fn internal_message(
    destination: &WalletAddress,
    amount: u64,
    comment: Option<&str>,
) -> Result<Cell, CellError> {
    let mut builder = CellBuilder::new()
        .store_bit(false) // int_msg_info
        .store_bit(true) // ihr disabled
        .store_bit(true) // bounceable
        .store_bit(false) // not bounced
        .store_address(None) // source filled in by the wallet contract
        .store_address(Some(destination))
        .store_coins(amount)
        .store_bit(false) // no extra currencies
        .store_coins(0) // ihr fee
        .store_coins(0) // forwarding fee
        .store_uint(0, 64) // created_lt
        .store_uint(0, 32) // created_at
        .store_bit(false); // no state init

    builder = match comment {
        Some(text) => {
            let payload = CellBuilder::new()
                .store_uint(COMMENT_OPCODE as u64, 32)
                .store_bytes(text.as_bytes())
                .finish()?;
            builder.store_bit(true).store_ref(payload)
        }
        None => builder.store_bit(false),
    };

    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::derive_keys;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon art";

    fn fixture() -> (WalletKeys, WalletAddress, WalletAddress) {
        let keys = derive_keys(PHRASE).unwrap();
        let wallet = WalletAddress::new(0, [0x11; 32]);
        let dest = WalletAddress::new(0, [0x22; 32]);
        (keys, wallet, dest)
    }

    #[test]
    fn identical_inputs_produce_identical_bytes() {
        let (keys, wallet, dest) = fixture();
        let a = build_transfer(&keys, &wallet, &dest, 1_000_000_000, 5, Some("tg:555555555"))
            .unwrap();
        let b = build_transfer(&keys, &wallet, &dest, 1_000_000_000, 5, Some("tg:555555555"))
            .unwrap();
        assert_eq!(a.boc, b.boc);
        assert_eq!(a.body_hash, b.body_hash);
    }

    #[test]
    fn seqno_changes_the_signed_body() {
        let (keys, wallet, dest) = fixture();
        let a = build_transfer(&keys, &wallet, &dest, 1_000, 5, None).unwrap();
        let b = build_transfer(&keys, &wallet, &dest, 1_000, 6, None).unwrap();
        assert_ne!(a.body_hash, b.body_hash);
        assert_ne!(a.boc, b.boc);
    }

    #[test]
    fn signature_verifies_against_body_hash() {
        let (keys, wallet, dest) = fixture();
        let msg = build_transfer(&keys, &wallet, &dest, 42, 0, None).unwrap();
        assert!(keys.verify(&msg.body_hash, &msg.signature));
    }

    #[test]
    fn envelope_is_a_valid_bag_of_cells() {
        let (keys, wallet, dest) = fixture();
        let msg = build_transfer(&keys, &wallet, &dest, 42, 7, Some("hello")).unwrap();
        assert_eq!(&msg.boc[..4], &[0xb5, 0xee, 0x9c, 0x72]);
        // envelope, signed body, internal message, comment payload
        assert_eq!(msg.boc[6], 4);
    }

    #[test]
    fn comment_adds_a_payload_cell() {
        let (keys, wallet, dest) = fixture();
        let without = build_transfer(&keys, &wallet, &dest, 42, 7, None).unwrap();
        let with = build_transfer(&keys, &wallet, &dest, 42, 7, Some("x")).unwrap();
        assert_eq!(without.boc[6], 3);
        assert_eq!(with.boc[6], 4);
    }

    #[test]
    fn oversized_comment_rejected() {
        let (keys, wallet, dest) = fixture();
        let long = "9".repeat(200);
        let err = build_transfer(&keys, &wallet, &dest, 42, 7, Some(&long)).unwrap_err();
        assert!(matches!(err, CellError::BitOverflow(_)));
    }

    #[test]
    fn base64_form_round_trips() {
        use base64ct::{Base64, Encoding};
        let (keys, wallet, dest) = fixture();
        let msg = build_transfer(&keys, &wallet, &dest, 42, 7, None).unwrap();
        let decoded = Base64::decode_vec(&msg.boc_base64()).unwrap();
        assert_eq!(decoded, msg.boc);
    }
}
