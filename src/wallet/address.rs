// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! On-chain wallet address parsing and formatting.
//!
//! Two textual forms circulate for the same underlying (workchain,
//! account-hash) pair:
//!
//! - **raw**: `0:af3c...` - workchain id, a colon, then 64 hex digits
//! - **user-friendly**: 48 base64 characters packing a tag byte (bounceable
//!   `0x11` / non-bounceable `0x51`), the workchain byte, the 32-byte hash,
//!   and a CRC16-XMODEM checksum
//!
//! Parsing accepts both forms (and both base64 alphabets); formatting
//! defaults to the raw form, with [`WalletAddress::to_user_friendly`] for
//! display surfaces.

use std::fmt;
use std::str::FromStr;

use base64ct::{Base64Unpadded, Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag byte for bounceable user-friendly addresses.
const TAG_BOUNCEABLE: u8 = 0x11;
/// Tag byte for non-bounceable user-friendly addresses.
const TAG_NON_BOUNCEABLE: u8 = 0x51;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("unrecognized address format: {0}")]
    Format(String),

    #[error("invalid workchain id: {0}")]
    Workchain(String),

    #[error("invalid account hash: {0}")]
    Hash(String),

    #[error("address checksum mismatch")]
    Checksum,
}

/// A parsed on-chain address: workchain id plus 32-byte account hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalletAddress {
    workchain: i8,
    hash: [u8; 32],
}

impl WalletAddress {
    pub fn new(workchain: i8, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    pub fn workchain(&self) -> i8 {
        self.workchain
    }

    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Format as the 48-character user-friendly base64url form.
    pub fn to_user_friendly(&self, bounceable: bool) -> String {
        let tag = if bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        let mut payload = [0u8; 36];
        payload[0] = tag;
        payload[1] = self.workchain as u8;
        payload[2..34].copy_from_slice(&self.hash);
        let crc = crc16_xmodem(&payload[..34]);
        payload[34..].copy_from_slice(&crc.to_be_bytes());
        Base64UrlUnpadded::encode_string(&payload)
    }

    fn parse_raw(s: &str) -> Result<Self, AddressError> {
        let (wc_str, hash_str) = s
            .split_once(':')
            .ok_or_else(|| AddressError::Format(s.to_string()))?;
        let workchain: i8 = wc_str
            .parse()
            .map_err(|_| AddressError::Workchain(wc_str.to_string()))?;
        let bytes = hex::decode(hash_str).map_err(|_| AddressError::Hash(hash_str.to_string()))?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AddressError::Hash(hash_str.to_string()))?;
        Ok(Self { workchain, hash })
    }

    fn parse_user_friendly(s: &str) -> Result<Self, AddressError> {
        let bytes = Base64UrlUnpadded::decode_vec(s)
            .or_else(|_| Base64Unpadded::decode_vec(s))
            .map_err(|_| AddressError::Format(s.to_string()))?;
        if bytes.len() != 36 {
            return Err(AddressError::Format(s.to_string()));
        }
        let tag = bytes[0] & 0x7f; // high bit flags testnet-only addresses
        if tag != TAG_BOUNCEABLE && tag != TAG_NON_BOUNCEABLE {
            return Err(AddressError::Format(s.to_string()));
        }

        let expected = u16::from_be_bytes([bytes[34], bytes[35]]);
        if crc16_xmodem(&bytes[..34]) != expected {
            return Err(AddressError::Checksum);
        }

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);
        Ok(Self {
            workchain: bytes[1] as i8,
            hash,
        })
    }
}

impl FromStr for WalletAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.contains(':') {
            Self::parse_raw(s)
        } else if s.len() == 48 {
            Self::parse_user_friendly(s)
        } else {
            Err(AddressError::Format(s.to_string()))
        }
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workchain, hex::encode(self.hash))
    }
}

impl Serialize for WalletAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for WalletAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// CRC16-XMODEM (polynomial 0x1021, zero initial value).
fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hash() -> [u8; 32] {
        let mut hash = [0u8; 32];
        for (i, b) in hash.iter_mut().enumerate() {
            *b = i as u8;
        }
        hash
    }

    #[test]
    fn user_friendly_golden_vectors() {
        let addr = WalletAddress::new(0, sample_hash());
        assert_eq!(
            addr.to_user_friendly(true),
            "EQAAAQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHx2j"
        );
        assert_eq!(
            addr.to_user_friendly(false),
            "UQAAAQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eH0Bm"
        );
    }

    #[test]
    fn parse_raw_round_trip() {
        let addr = WalletAddress::new(0, sample_hash());
        let parsed: WalletAddress = addr.to_string().parse().unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn parse_user_friendly_round_trip() {
        let addr = WalletAddress::new(0, sample_hash());
        for bounceable in [true, false] {
            let parsed: WalletAddress = addr.to_user_friendly(bounceable).parse().unwrap();
            assert_eq!(parsed, addr);
        }
    }

    #[test]
    fn bounceable_and_non_bounceable_parse_to_same_account() {
        let addr = WalletAddress::new(0, sample_hash());
        let a: WalletAddress = addr.to_user_friendly(true).parse().unwrap();
        let b: WalletAddress = addr.to_user_friendly(false).parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let addr = WalletAddress::new(0, sample_hash());
        let mut friendly = addr.to_user_friendly(true);
        // Flip a character inside the hash portion.
        friendly.replace_range(10..11, if &friendly[10..11] == "A" { "B" } else { "A" });
        let err = friendly.parse::<WalletAddress>().unwrap_err();
        assert_eq!(err, AddressError::Checksum);
    }

    #[test]
    fn malformed_inputs_rejected() {
        assert!("".parse::<WalletAddress>().is_err());
        assert!("0:short".parse::<WalletAddress>().is_err());
        assert!("not-an-address".parse::<WalletAddress>().is_err());
        assert!("9999:abcd".parse::<WalletAddress>().is_err());
    }

    #[test]
    fn masterchain_workchain_survives_round_trip() {
        let addr = WalletAddress::new(-1, sample_hash());
        let parsed: WalletAddress = addr.to_user_friendly(true).parse().unwrap();
        assert_eq!(parsed.workchain(), -1);
    }

    #[test]
    fn serde_uses_raw_form() {
        let addr = WalletAddress::new(0, sample_hash());
        let json = serde_json::to_string(&addr).unwrap();
        assert!(json.contains("0:000102"));
        let back: WalletAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
