// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Recovery-phrase validation and Ed25519 key derivation.
//!
//! The custodial wallet is controlled by a 24-word BIP39 phrase supplied
//! through configuration. Validation fails closed: a wrong word count, a
//! token outside the English wordlist, or a checksum mismatch is a hard
//! error, never a best-effort guess. Derivation is deterministic:
//! HMAC-SHA512 over the BIP39 seed keyed by the coin derivation path, first
//! 32 bytes taken as the Ed25519 secret key.
//!
//! Keys live in process memory for the process lifetime and are never
//! written to the ledger store.

use bip39::Mnemonic;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use thiserror::Error;

type HmacSha512 = Hmac<Sha512>;

/// BIP44 derivation path (607 = TON coin type).
const DERIVATION_PATH: &str = "m/44'/607'/0'/0/0";

/// Required phrase length for the custodial wallet.
const PHRASE_WORDS: usize = 24;

/// Errors arising from recovery-phrase handling.
#[derive(Debug, Error)]
pub enum PhraseError {
    #[error("expected {PHRASE_WORDS} words, got {0}")]
    WordCount(usize),

    #[error("word at position {0} is not in the BIP39 English wordlist")]
    UnknownWord(usize),

    #[error("phrase checksum mismatch")]
    Checksum,

    #[error("invalid phrase: {0}")]
    Invalid(String),
}

/// Derived signing keypair for the custodial wallet.
#[derive(Debug)]
pub struct WalletKeys {
    signing: SigningKey,
}

impl WalletKeys {
    /// Raw 32-byte public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Sign arbitrary bytes, returning the 64-byte Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    /// Verify a signature produced by [`WalletKeys::sign`].
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let sig = ed25519_dalek::Signature::from_bytes(signature);
        VerifyingKey::from_bytes(&self.public_key())
            .map(|vk| vk.verify(message, &sig).is_ok())
            .unwrap_or(false)
    }
}

/// Derive the custodial wallet keypair from a recovery phrase.
///
/// The phrase is normalized (collapsed whitespace, lowercased) before
/// validation so values that survived deployment-tooling round trips still
/// parse, but any remaining ambiguity is a hard error.
pub fn derive_keys(phrase: &str) -> Result<WalletKeys, PhraseError> {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    if words.len() != PHRASE_WORDS {
        return Err(PhraseError::WordCount(words.len()));
    }

    let normalized = words.join(" ").to_lowercase();
    let mnemonic = Mnemonic::parse_normalized(&normalized).map_err(|e| match e {
        bip39::Error::BadWordCount(n) => PhraseError::WordCount(n),
        bip39::Error::UnknownWord(idx) => PhraseError::UnknownWord(idx),
        bip39::Error::InvalidChecksum => PhraseError::Checksum,
        other => PhraseError::Invalid(other.to_string()),
    })?;

    // BIP39 seed derivation (PBKDF2-HMAC-SHA512, empty passphrase), then one
    // HMAC-SHA512 step keyed by the derivation path. The first 32 bytes of
    // the output become the Ed25519 secret key.
    let seed = mnemonic.to_seed_normalized("");

    let mut mac = HmacSha512::new_from_slice(DERIVATION_PATH.as_bytes())
        .map_err(|e| PhraseError::Invalid(e.to_string()))?;
    mac.update(&seed);
    let derived = mac.finalize().into_bytes();

    let mut secret = [0u8; 32];
    secret.copy_from_slice(&derived[..32]);

    Ok(WalletKeys {
        signing: SigningKey::from_bytes(&secret),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon art";

    #[test]
    fn derivation_is_deterministic() {
        let k1 = derive_keys(VALID_PHRASE).unwrap();
        let k2 = derive_keys(VALID_PHRASE).unwrap();
        assert_eq!(k1.public_key(), k2.public_key());
    }

    #[test]
    fn whitespace_and_case_are_normalized() {
        let messy = format!("  {}  ", VALID_PHRASE.replace(' ', "   ").to_uppercase());
        let k1 = derive_keys(VALID_PHRASE).unwrap();
        let k2 = derive_keys(&messy).unwrap();
        assert_eq!(k1.public_key(), k2.public_key());
    }

    #[test]
    fn wrong_word_count_rejected() {
        let err = derive_keys("abandon abandon art").unwrap_err();
        assert!(matches!(err, PhraseError::WordCount(3)));
    }

    #[test]
    fn unknown_word_rejected() {
        let phrase = VALID_PHRASE.replacen("abandon", "zzzzzz", 1);
        let err = derive_keys(&phrase).unwrap_err();
        assert!(matches!(err, PhraseError::UnknownWord(_)));
    }

    #[test]
    fn checksum_mismatch_rejected() {
        // Swapping the final checksum-bearing word breaks the checksum.
        let phrase = VALID_PHRASE.replace(" art", " zoo");
        let err = derive_keys(&phrase).unwrap_err();
        assert!(matches!(err, PhraseError::Checksum));
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let keys = derive_keys(VALID_PHRASE).unwrap();
        let sig = keys.sign(b"settlement message");
        assert!(keys.verify(b"settlement message", &sig));
        assert!(!keys.verify(b"tampered message", &sig));
    }

    #[test]
    fn signatures_are_deterministic() {
        let keys = derive_keys(VALID_PHRASE).unwrap();
        assert_eq!(keys.sign(b"payload"), keys.sign(b"payload"));
    }
}
