// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Block and bucket structures for rORAM.

use crate::params::Params;

/// Sentinel logical address denoting a dummy block.
pub const INVALID_ADDR: u64 = u64::MAX;

/// A fixed-width record: a payload of `B` bytes, a logical address (or `INVALID_ADDR` for a
/// dummy), and one leaf tag `p[j]` per sub-ORAM `R_j`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// The block's payload.
    pub data: Vec<u8>,
    /// Logical address in `[0, N)`, or `INVALID_ADDR` for a dummy block.
    pub a: u64,
    /// `p[j]` is the leaf index in sub-ORAM `R_j` this block is currently assigned to.
    pub p: Vec<u64>,
}

impl Block {
    /// Constructs a dummy block sized for `data_len` payload bytes and `num_sub_orams` tags.
    pub fn dummy(data_len: usize, num_sub_orams: usize) -> Self {
        Self {
            data: vec![0u8; data_len],
            a: INVALID_ADDR,
            p: vec![0u64; num_sub_orams],
        }
    }

    /// Whether this block represents a real (non-dummy) logical address.
    pub fn is_valid(&self) -> bool {
        self.a != INVALID_ADDR
    }

    /// Resets this block to a dummy in place.
    pub fn set_dummy(&mut self) {
        self.a = INVALID_ADDR;
        self.data.iter_mut().for_each(|b| *b = 0);
        self.p.iter_mut().for_each(|p| *p = 0);
    }

    /// Serialized size in bytes: `payload || a || p[0..=ell]`, little-endian 8-byte integers.
    pub fn serialized_size(params: &Params) -> usize {
        params.block_byte_size()
    }

    /// Serializes this block into `out`, which must be exactly `serialized_size(params)` bytes.
    pub fn serialize(&self, out: &mut [u8], params: &Params) {
        let mut off = 0;
        out[off..off + params.b].copy_from_slice(&self.data);
        off += params.b;
        out[off..off + 8].copy_from_slice(&self.a.to_le_bytes());
        off += 8;
        for tag in &self.p {
            out[off..off + 8].copy_from_slice(&tag.to_le_bytes());
            off += 8;
        }
    }

    /// Deserializes a block from `input`, which must be exactly `serialized_size(params)` bytes.
    pub fn deserialize(input: &[u8], params: &Params) -> Self {
        let mut off = 0;
        let data = input[off..off + params.b].to_vec();
        off += params.b;
        let a = u64::from_le_bytes(input[off..off + 8].try_into().unwrap());
        off += 8;
        let num_sub_orams = params.num_sub_orams() as usize;
        let mut p = Vec::with_capacity(num_sub_orams);
        for _ in 0..num_sub_orams {
            p.push(u64::from_le_bytes(input[off..off + 8].try_into().unwrap()));
            off += 8;
        }
        Self { data, a, p }
    }
}

/// A fixed array of exactly `Z` blocks; unused slots hold dummies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// The blocks held by this bucket, length `Z`.
    pub blocks: Vec<Block>,
}

impl Bucket {
    /// Constructs a bucket of `z` dummy blocks.
    pub fn dummy(z: usize, data_len: usize, num_sub_orams: usize) -> Self {
        Self {
            blocks: (0..z).map(|_| Block::dummy(data_len, num_sub_orams)).collect(),
        }
    }

    /// A bucket of `params.z` dummy blocks sized per `params`.
    pub fn empty(params: &Params) -> Self {
        Self::dummy(
            params.z as usize,
            params.b,
            params.num_sub_orams() as usize,
        )
    }

    /// Serialized size in bytes: the concatenation of its blocks' serializations.
    pub fn serialized_size(params: &Params) -> usize {
        params.bucket_byte_size()
    }

    /// Serializes this bucket into `out`, which must be exactly `serialized_size(params)` bytes.
    pub fn serialize(&self, out: &mut [u8], params: &Params) {
        let block_size = Block::serialized_size(params);
        for (i, block) in self.blocks.iter().enumerate() {
            block.serialize(&mut out[i * block_size..(i + 1) * block_size], params);
        }
    }

    /// Deserializes a bucket of `params.z` blocks from `input`.
    pub fn deserialize(input: &[u8], params: &Params) -> Self {
        let block_size = Block::serialized_size(params);
        let blocks = (0..params.z as usize)
            .map(|i| Block::deserialize(&input[i * block_size..(i + 1) * block_size], params))
            .collect();
        Self { blocks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> Params {
        Params::new(16, 4, 3, 8).unwrap()
    }

    #[test]
    fn dummy_block_is_invalid() {
        let b = Block::dummy(8, 3);
        assert!(!b.is_valid());
        assert_eq!(b.a, INVALID_ADDR);
    }

    #[test]
    fn block_serialization_round_trips() {
        let params = test_params();
        let mut block = Block::dummy(params.b, params.num_sub_orams() as usize);
        block.a = 7;
        block.data = vec![0xAB; params.b];
        block.p = vec![1, 2, 3];

        let mut buf = vec![0u8; Block::serialized_size(&params)];
        block.serialize(&mut buf, &params);
        let round_tripped = Block::deserialize(&buf, &params);

        assert_eq!(block, round_tripped);
    }

    #[test]
    fn bucket_serialization_round_trips() {
        let params = test_params();
        let mut bucket = Bucket::empty(&params);
        bucket.blocks[0].a = 3;
        bucket.blocks[0].data = vec![0x11; params.b];
        bucket.blocks[0].p = vec![4, 5, 6];

        let mut buf = vec![0u8; Bucket::serialized_size(&params)];
        bucket.serialize(&mut buf, &params);
        let round_tripped = Bucket::deserialize(&buf, &params);

        assert_eq!(bucket, round_tripped);
    }

    #[test]
    fn set_dummy_clears_fields() {
        let mut block = Block {
            data: vec![9; 8],
            a: 5,
            p: vec![1, 2, 3],
        };
        block.set_dummy();
        assert!(!block.is_valid());
        assert!(block.data.iter().all(|&b| b == 0));
        assert!(block.p.iter().all(|&p| p == 0));
    }
}
