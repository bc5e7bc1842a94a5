// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The rORAM coordinator: routes a range request to the right sub-ORAM, redistributes read
//! blocks into every sub-ORAM's stash, and triggers a cross-family eviction.

use crate::block::Block;
use crate::crypto::CryptoProvider;
use crate::error::RoramError;
use crate::params::Params;
use crate::storage::{FileStorage, MemoryStorage, StorageBackend};
use crate::sub_oram::SubOram;

/// A logical operation requested of the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    /// Reads the requested range, returning the blocks' payloads.
    Read,
    /// Overwrites the requested range with caller-supplied payloads.
    Write,
}

/// Holds all sub-ORAMs `R_0..=R_ell`, the shared crypto provider, and the global eviction
/// counter. Owned exclusively by one caller at a time (see the crate's concurrency notes).
///
/// Each sub-ORAM's storage backend is type-erased (`Box<dyn StorageBackend>`) so a single
/// coordinator type can be backed by in-memory storage, file storage, or a mix, chosen at
/// construction time rather than fixed by a generic parameter.
pub struct RoramCoordinator<C: CryptoProvider> {
    params: Params,
    crypto: C,
    sub_orams: Vec<SubOram>,
    cnt: u64,
}

impl<C: CryptoProvider> RoramCoordinator<C> {
    /// Constructs a coordinator backed by one in-memory `MemoryStorage` per sub-ORAM.
    pub fn new_in_memory(params: Params, crypto: C) -> Self {
        let sub_orams = (0..=params.ell)
            .map(|i| SubOram::new(params, i, Box::new(MemoryStorage::new(params))))
            .collect();
        Self {
            params,
            crypto,
            sub_orams,
            cnt: 0,
        }
    }

    /// Constructs a coordinator backed by one file per sub-ORAM, named `<file_prefix>_tree<i>`.
    pub fn new_file_backed(
        params: Params,
        crypto: C,
        file_prefix: &str,
    ) -> Result<Self, RoramError> {
        let mut sub_orams = Vec::with_capacity(params.num_sub_orams() as usize);
        for i in 0..=params.ell {
            let path = format!("{file_prefix}_tree{i}");
            let storage: Box<dyn StorageBackend> = Box::new(FileStorage::new(params, path)?);
            sub_orams.push(SubOram::new(params, i, storage));
        }
        Ok(Self {
            params,
            crypto,
            sub_orams,
            cnt: 0,
        })
    }

    /// Services one range request `[a, a + r)`. `data` must hold exactly `r` payloads of `B`
    /// bytes each for a write, and is ignored for a read. Returns `r` payloads for a read
    /// (zero-filled for addresses never written), or an empty vector for a write.
    pub fn access(
        &mut self,
        a: u64,
        r: u64,
        op: Op,
        data: Option<&[Vec<u8>]>,
    ) -> Result<Vec<Vec<u8>>, RoramError> {
        if r == 0 {
            return Ok(Vec::new());
        }
        if r > self.params.l {
            return Err(RoramError::BadParameter(format!(
                "range size {r} exceeds L={}",
                self.params.l
            )));
        }
        if a + r > self.params.n {
            return Err(RoramError::BadParameter(format!(
                "range [{a}, {}) exceeds N={}",
                a + r,
                self.params.n
            )));
        }
        if op == Op::Write {
            let data = data.ok_or_else(|| {
                RoramError::BadParameter("write access requires payload data".into())
            })?;
            if data.len() as u64 != r {
                return Err(RoramError::BadParameter(format!(
                    "expected {r} payloads, got {}",
                    data.len()
                )));
            }
        }

        let i = Params::range_exponent(r).min(self.params.ell);
        let range = 1u64 << i;
        let a0 = (a / range) * range;
        let mut a1 = a0 + range;
        if a1 > self.params.n {
            a1 = a0;
        }

        let new_path0 = self.crypto.random_path(self.params.n);
        let blocks0 = self.sub_orams[i as usize].read_range(a0, new_path0)?;
        let (blocks1, new_path1) = if a1 != a0 {
            let new_path1 = self.crypto.random_path(self.params.n);
            (self.sub_orams[i as usize].read_range(a1, new_path1)?, new_path1)
        } else {
            (Vec::new(), new_path0)
        };

        let mut working_set: Vec<Block> = blocks0;
        for block in blocks1 {
            if !working_set.iter().any(|b| b.a == block.a) {
                working_set.push(block);
            }
        }

        if op == Op::Write {
            let num_sub_orams = self.params.num_sub_orams() as usize;
            for addr in a..a + r {
                if !working_set.iter().any(|b| b.a == addr) {
                    let mut fresh = Block::dummy(self.params.b, num_sub_orams);
                    fresh.a = addr;
                    working_set.push(fresh);
                }
            }
        }

        working_set.sort_by_key(|b| b.a);

        for block in &mut working_set {
            if block.a >= a0 && block.a < a0 + range {
                block.p[i as usize] = new_path0 + (block.a - a0);
            } else if block.a >= a1 && block.a < a1 + range {
                block.p[i as usize] = new_path1 + (block.a - a1);
            }
        }

        if op == Op::Write {
            let data = data.expect("validated above");
            for addr in a..a + r {
                let offset = (addr - a) as usize;
                if let Some(block) = working_set.iter_mut().find(|b| b.a == addr) {
                    block.data = data[offset].clone();
                }
            }
        }

        let purge_lo = a0;
        let purge_hi = a0 + 2 * range;
        for sub_oram in &mut self.sub_orams {
            let stash = sub_oram.stash_mut();
            stash.retain(|b| !(b.a >= purge_lo && b.a < purge_hi));
            stash.extend(working_set.iter().cloned());
            sub_oram.batch_evict(2 * range, self.cnt)?;
        }
        self.cnt += 2 * range;

        log::debug!(
            "Access(a={a}, r={r}, op={op:?}) class i={i} cnt_after={}",
            self.cnt
        );

        if op == Op::Read {
            let mut result = Vec::with_capacity(r as usize);
            for addr in a..a + r {
                match working_set.iter().find(|b| b.a == addr) {
                    Some(block) => result.push(block.data.clone()),
                    None => result.push(vec![0u8; self.params.b]),
                }
            }
            Ok(result)
        } else {
            Ok(Vec::new())
        }
    }

    /// Sum of advisory seek counts across all sub-ORAM storage backends.
    pub fn seek_count(&self) -> u64 {
        self.sub_orams.iter().map(|s| s.seek_count()).sum()
    }

    /// This coordinator's parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Checks invariants 3-5 of §3 against live state: every sub-ORAM's on-storage blocks sit at
    /// the bucket their own leaf tag implies (3), no bucket holds more than `Z` valid blocks (4),
    /// and no stash holds two entries for the same address (5). Test-only.
    #[cfg(test)]
    fn check_invariants(&mut self) {
        use std::collections::HashMap;

        for (j, sub_oram) in self.sub_orams.iter_mut().enumerate() {
            let entries = sub_oram.debug_scan_tree().expect("debug_scan_tree");
            let mut occupancy: HashMap<(u32, u64), u64> = HashMap::new();
            for (level, index, block) in &entries {
                let n_buckets = 1u64 << level;
                assert_eq!(
                    block.p[j] % n_buckets,
                    *index,
                    "invariant 3 violated: R_{j} block a={} at level {level} index {index} \
                     has p[{j}]={} (mod {n_buckets} = {})",
                    block.a,
                    block.p[j],
                    block.p[j] % n_buckets
                );
                *occupancy.entry((*level, *index)).or_insert(0) += 1;
            }
            for ((level, index), count) in &occupancy {
                assert!(
                    *count <= self.params.z,
                    "invariant 4 violated: R_{j} bucket level={level} index={index} holds \
                     {count} valid blocks, Z={}",
                    self.params.z
                );
            }

            let stash = sub_oram.stash();
            let mut seen = std::collections::HashSet::new();
            for block in stash {
                assert!(
                    seen.insert(block.a),
                    "invariant 5 violated: R_{j} stash holds duplicate address {}",
                    block.a
                );
            }
        }
    }
}
