// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account-identifier extraction from transfer comments.
//!
//! Depositors embed their account identifier in the transfer comment so the
//! scanner can attribute the funds. Upstream transports expose the comment
//! in several shapes - decoded text, raw payload bytes still carrying the
//! 32-bit opcode tag - so decoding tries each in turn before the single
//! pattern match: a run of 8-12 digits, optionally prefixed with `tg:`.

use crate::models::AccountId;

/// Result of scanning a comment for an account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierMatch {
    Found(AccountId),
    NotFound,
}

impl IdentifierMatch {
    pub fn found(self) -> Option<AccountId> {
        match self {
            Self::Found(id) => Some(id),
            Self::NotFound => None,
        }
    }
}

/// Minimum and maximum identifier digit counts.
const MIN_DIGITS: usize = 8;
const MAX_DIGITS: usize = 12;

/// Opcode tag length prefixed to raw comment payloads.
const OPCODE_TAG_LEN: usize = 4;

/// Extract an account identifier from raw comment bytes.
///
/// Pure function: feeds every decoding of the bytes through
/// [`find_identifier`] and returns the first hit.
pub fn extract_identifier(comment: &[u8]) -> IdentifierMatch {
    for text in decodings(comment) {
        if let IdentifierMatch::Found(id) = find_identifier(&text) {
            return IdentifierMatch::Found(id);
        }
    }
    IdentifierMatch::NotFound
}

/// Candidate text decodings of the raw bytes: as-is, and with a leading
/// zero opcode tag stripped.
fn decodings(comment: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    if !comment.is_empty() {
        out.push(String::from_utf8_lossy(comment).into_owned());
    }
    if comment.len() > OPCODE_TAG_LEN && comment[..OPCODE_TAG_LEN] == [0, 0, 0, 0] {
        out.push(String::from_utf8_lossy(&comment[OPCODE_TAG_LEN..]).into_owned());
    }
    out
}

/// Find the first maximal digit run of 8-12 digits in `text`.
///
/// Longer runs are rejected rather than truncated: a 13-digit number is
/// not an identifier with junk appended, it is a different number.
pub fn find_identifier(text: &str) -> IdentifierMatch {
    let bytes = text.as_bytes();
    let mut start = None;
    for (i, b) in bytes.iter().chain(std::iter::once(&b' ')).enumerate() {
        if b.is_ascii_digit() {
            start.get_or_insert(i);
            continue;
        }
        if let Some(s) = start.take() {
            let run = &text[s..i];
            if (MIN_DIGITS..=MAX_DIGITS).contains(&run.len()) {
                if let Ok(id) = run.parse::<AccountId>() {
                    return IdentifierMatch::Found(id);
                }
            }
        }
    }
    IdentifierMatch::NotFound
}
