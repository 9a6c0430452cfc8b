// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cell-tree codec for the chain's binary message format.
//!
//! Signed messages are encoded as a DAG of *cells*: up to 1023 data bits and
//! up to four ordered references per cell. Cells are built bottom-up with
//! [`CellBuilder`] and serialized top-down into the standard bag-of-cells
//! container by [`encode_boc`]. Encoding is a pure, total function of the
//! tree; the representation hash ([`Cell::repr_hash`]) is what gets signed.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::wallet::WalletAddress;

/// Maximum data bits per cell.
const MAX_BITS: usize = 1023;
/// Maximum references per cell.
const MAX_REFS: usize = 4;

/// Bag-of-cells magic prefix.
const BOC_MAGIC: [u8; 4] = [0xb5, 0xee, 0x9c, 0x72];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CellError {
    #[error("cell data overflow: {0} bits (max {MAX_BITS})")]
    BitOverflow(usize),

    #[error("cell reference overflow: {0} refs (max {MAX_REFS})")]
    RefOverflow(usize),
}

/// An immutable cell: data bits plus ordered child references.
///
/// The representation hash and depth are computed at construction, so
/// signing and serialization never re-walk the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
    hash: [u8; 32],
    depth: u16,
}

impl Cell {
    fn new(data: Vec<u8>, bit_len: usize, refs: Vec<Arc<Cell>>) -> Self {
        let depth = refs.iter().map(|r| r.depth + 1).max().unwrap_or(0);
        let mut cell = Self {
            data,
            bit_len,
            refs,
            hash: [0u8; 32],
            depth,
        };
        cell.hash = Sha256::digest(cell.repr()).into();
        cell
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn refs(&self) -> &[Arc<Cell>] {
        &self.refs
    }

    /// Standard representation hash: what wallet contracts verify
    /// signatures against.
    pub fn repr_hash(&self) -> [u8; 32] {
        self.hash
    }

    /// Data bytes with the completion tag applied to a partial last byte.
    fn augmented_data(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        if self.bit_len % 8 != 0 {
            out[self.bit_len / 8] |= 0x80 >> (self.bit_len % 8);
        }
        out
    }

    /// First descriptor byte: reference count (ordinary, level-zero cells).
    fn d1(&self) -> u8 {
        self.refs.len() as u8
    }

    /// Second descriptor byte: data length in half-filled-byte units.
    fn d2(&self) -> u8 {
        (self.bit_len / 8 + self.bit_len.div_ceil(8)) as u8
    }

    /// Representation preimage: descriptors, augmented data, then each
    /// child's depth and hash.
    fn repr(&self) -> Vec<u8> {
        let mut out = vec![self.d1(), self.d2()];
        out.extend_from_slice(&self.augmented_data());
        for r in &self.refs {
            out.extend_from_slice(&r.depth.to_be_bytes());
        }
        for r in &self.refs {
            out.extend_from_slice(&r.hash);
        }
        out
    }
}

/// Bottom-up cell construction with bit-level writes.
///
/// Builders are chainable by value; limits are enforced once in
/// [`CellBuilder::finish`].
#[derive(Debug, Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_bit(&mut self, bit: bool) {
        if self.bit_len / 8 == self.data.len() {
            self.data.push(0);
        }
        if bit {
            self.data[self.bit_len / 8] |= 0x80 >> (self.bit_len % 8);
        }
        self.bit_len += 1;
    }

    pub fn store_bit(mut self, bit: bool) -> Self {
        self.push_bit(bit);
        self
    }

    /// Store the low `bits` bits of `value`, most significant first.
    pub fn store_uint(mut self, value: u64, bits: usize) -> Self {
        for i in (0..bits).rev() {
            self.push_bit(value >> i & 1 == 1);
        }
        self
    }

    pub fn store_bytes(mut self, bytes: &[u8]) -> Self {
        for &byte in bytes {
            for i in (0..8).rev() {
                self.push_bit(byte >> i & 1 == 1);
            }
        }
        self
    }

    /// Variable-length coin amount: a 4-bit byte-length prefix followed by
    /// the big-endian value bytes.
    pub fn store_coins(mut self, amount: u64) -> Self {
        let len = (8 - amount.leading_zeros() as usize / 8).min(8);
        self = self.store_uint(len as u64, 4);
        if len > 0 {
            let bytes = amount.to_be_bytes();
            self = self.store_bytes(&bytes[8 - len..]);
        }
        self
    }

    /// Standard address: tag + no-anycast bit + workchain + account hash.
    /// `None` stores the two-bit absent-address marker.
    pub fn store_address(mut self, address: Option<&WalletAddress>) -> Self {
        match address {
            Some(addr) => {
                self = self.store_uint(0b100, 3); // addr_std, no anycast
                self = self.store_uint(addr.workchain() as u8 as u64, 8);
                self.store_bytes(addr.hash())
            }
            None => self.store_uint(0b00, 2),
        }
    }

    pub fn store_ref(mut self, cell: Cell) -> Self {
        self.refs.push(Arc::new(cell));
        self
    }

    /// Append another cell's data bits and references in place.
    pub fn store_cell(mut self, cell: &Cell) -> Self {
        for i in 0..cell.bit_len {
            self.push_bit(cell.data[i / 8] & (0x80 >> (i % 8)) != 0);
        }
        self.refs.extend(cell.refs.iter().cloned());
        self
    }

    pub fn finish(self) -> Result<Cell, CellError> {
        if self.bit_len > MAX_BITS {
            return Err(CellError::BitOverflow(self.bit_len));
        }
        if self.refs.len() > MAX_REFS {
            return Err(CellError::RefOverflow(self.refs.len()));
        }
        Ok(Cell::new(self.data, self.bit_len, self.refs))
    }
}

/// Serialize a cell tree into the standard bag-of-cells container
/// (no index table, no checksum trailer).
pub fn encode_boc(root: &Cell) -> Vec<u8> {
    // Order unique cells so every reference points to a higher index:
    // sort by maximum distance from the root, ties by first-visit order.
    let mut distance: HashMap<[u8; 32], usize> = HashMap::new();
    let mut first_seen: HashMap<[u8; 32], usize> = HashMap::new();
    let mut cells: Vec<&Cell> = Vec::new();
    let mut counter = 0usize;

    fn walk<'a>(
        cell: &'a Cell,
        dist: usize,
        distance: &mut HashMap<[u8; 32], usize>,
        first_seen: &mut HashMap<[u8; 32], usize>,
        cells: &mut Vec<&'a Cell>,
        counter: &mut usize,
    ) {
        let hash = cell.hash;
        let known = distance.get(&hash).copied();
        if known.is_none() {
            first_seen.insert(hash, *counter);
            *counter += 1;
            cells.push(cell);
        }
        if known.is_none_or(|d| dist > d) {
            distance.insert(hash, dist);
            for r in &cell.refs {
                walk(r, dist + 1, distance, first_seen, cells, counter);
            }
        }
    }
    walk(
        root,
        0,
        &mut distance,
        &mut first_seen,
        &mut cells,
        &mut counter,
    );

    cells.sort_by_key(|c| (distance[&c.hash], first_seen[&c.hash]));
    let index: HashMap<[u8; 32], usize> = cells
        .iter()
        .enumerate()
        .map(|(i, c)| (c.hash, i))
        .collect();

    let ref_size = bytes_needed(cells.len() as u64);
    let serialized: Vec<Vec<u8>> = cells
        .iter()
        .map(|cell| {
            let mut out = vec![cell.d1(), cell.d2()];
            out.extend_from_slice(&cell.augmented_data());
            for r in &cell.refs {
                out.extend_from_slice(&to_be_sized(index[&r.hash] as u64, ref_size));
            }
            out
        })
        .collect();
    let total_size: usize = serialized.iter().map(Vec::len).sum();
    let offset_size = bytes_needed(total_size as u64);

    let mut boc = Vec::with_capacity(16 + total_size);
    boc.extend_from_slice(&BOC_MAGIC);
    boc.push(ref_size as u8); // no index, no checksum, no cache bits
    boc.push(offset_size as u8);
    boc.extend_from_slice(&to_be_sized(cells.len() as u64, ref_size));
    boc.extend_from_slice(&to_be_sized(1, ref_size)); // roots
    boc.extend_from_slice(&to_be_sized(0, ref_size)); // absent
    boc.extend_from_slice(&to_be_sized(total_size as u64, offset_size));
    boc.extend_from_slice(&to_be_sized(0, ref_size)); // root index
    for bytes in &serialized {
        boc.extend_from_slice(bytes);
    }
    boc
}

/// Minimum number of bytes needed to represent `value` (at least one).
fn bytes_needed(value: u64) -> usize {
    (8 - value.leading_zeros() as usize / 8).max(1)
}

fn to_be_sized(value: u64, size: usize) -> Vec<u8> {
    value.to_be_bytes()[8 - size..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cell_hash_matches_vector() {
        let cell = CellBuilder::new().finish().unwrap();
        // sha256 of the two zero descriptor bytes
        assert_eq!(
            hex::encode(cell.repr_hash()),
            "96a296d224f285c67bee93c30f8a309157f0daa35dc5b87e410b78630a09cfc7"
        );
    }

    #[test]
    fn empty_cell_boc_matches_vector() {
        let cell = CellBuilder::new().finish().unwrap();
        assert_eq!(hex::encode(encode_boc(&cell)), "b5ee9c72010101010002000000");
    }

    #[test]
    fn partial_byte_gets_completion_tag() {
        // 7 bits 1010101 -> augmented byte 0b10101011 = 0xab
        let cell = CellBuilder::new().store_uint(0b1010101, 7).finish().unwrap();
        assert_eq!(cell.augmented_data(), vec![0xab]);
        assert_eq!(cell.d2(), 1);
    }

    #[test]
    fn cell_with_ref_boc_matches_vector() {
        let child = CellBuilder::new().store_bytes(&[0xff]).finish().unwrap();
        let parent = CellBuilder::new()
            .store_uint(0b1010101, 7)
            .store_ref(child)
            .finish()
            .unwrap();
        assert_eq!(parent.depth, 1);
        assert_eq!(
            hex::encode(encode_boc(&parent)),
            "b5ee9c72010102010007000101ab010002ff"
        );
    }

    #[test]
    fn store_uint_is_big_endian() {
        let cell = CellBuilder::new().store_uint(0x0102, 16).finish().unwrap();
        assert_eq!(cell.augmented_data(), vec![0x01, 0x02]);
    }

    #[test]
    fn store_coins_encodes_length_prefix() {
        // 4-bit length 0 for zero amounts
        let zero = CellBuilder::new().store_coins(0).finish().unwrap();
        assert_eq!(zero.bit_len(), 4);
        assert_eq!(zero.augmented_data(), vec![0x08]); // 0000 + tag bit

        // 1 token-unit -> length 1, one value byte
        let one = CellBuilder::new().store_coins(1).finish().unwrap();
        assert_eq!(one.bit_len(), 12);
        assert_eq!(one.augmented_data(), vec![0x10, 0x18]); // 0001 00000001 + tag
    }

    #[test]
    fn store_address_none_is_two_zero_bits() {
        let cell = CellBuilder::new().store_address(None).finish().unwrap();
        assert_eq!(cell.bit_len(), 2);
    }

    #[test]
    fn store_address_std_is_267_bits() {
        let addr = WalletAddress::new(0, [0x42; 32]);
        let cell = CellBuilder::new()
            .store_address(Some(&addr))
            .finish()
            .unwrap();
        assert_eq!(cell.bit_len(), 3 + 8 + 256);
    }

    #[test]
    fn store_cell_appends_data_and_refs() {
        let leaf = CellBuilder::new().store_uint(7, 8).finish().unwrap();
        let inner = CellBuilder::new()
            .store_uint(0xaa, 8)
            .store_ref(leaf)
            .finish()
            .unwrap();
        let outer = CellBuilder::new()
            .store_uint(0x55, 8)
            .store_cell(&inner)
            .finish()
            .unwrap();
        assert_eq!(outer.augmented_data(), vec![0x55, 0xaa]);
        assert_eq!(outer.refs().len(), 1);
    }

    #[test]
    fn bit_overflow_rejected() {
        let mut builder = CellBuilder::new();
        for _ in 0..128 {
            builder = builder.store_uint(0, 8);
        }
        assert_eq!(builder.finish().unwrap_err(), CellError::BitOverflow(1024));
    }

    #[test]
    fn ref_overflow_rejected() {
        let mut builder = CellBuilder::new();
        for i in 0..5 {
            let child = CellBuilder::new().store_uint(i, 8).finish().unwrap();
            builder = builder.store_ref(child);
        }
        assert_eq!(builder.finish().unwrap_err(), CellError::RefOverflow(5));
    }

    #[test]
    fn identical_trees_hash_identically() {
        let build = || {
            let child = CellBuilder::new().store_uint(1, 32).finish().unwrap();
            CellBuilder::new()
                .store_uint(2, 32)
                .store_ref(child)
                .finish()
                .unwrap()
        };
        assert_eq!(build().repr_hash(), build().repr_hash());
        assert_eq!(encode_boc(&build()), encode_boc(&build()));
    }

    #[test]
    fn shared_subtree_serialized_once() {
        let shared = CellBuilder::new().store_uint(0xbeef, 16).finish().unwrap();
        let left = CellBuilder::new()
            .store_uint(1, 8)
            .store_ref(shared.clone())
            .finish()
            .unwrap();
        let root = CellBuilder::new()
            .store_ref(left)
            .store_ref(shared)
            .finish()
            .unwrap();
        let boc = encode_boc(&root);
        // 3 unique cells despite 4 tree nodes
        assert_eq!(boc[6], 3);
    }
}
