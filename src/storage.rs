// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Storage backends: contiguous bucket I/O at `(level, start_bucket, count)`.

use crate::block::Bucket;
use crate::error::RoramError;
use crate::params::Params;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Reads/writes contiguous runs of fixed-size buckets at `(level, start_bucket, count)`; tracks
/// a non-sequentiality counter. `level` has exactly `2^level` buckets, indexed `0..2^level`.
pub trait StorageBackend {
    /// Fills `out` with `count` deserialized buckets from `[start, start + count)` at `level`.
    /// Callers must ensure `start + count <= 2^level` (they split wrap-arounds themselves).
    fn read_buckets(
        &mut self,
        level: u32,
        start: u64,
        count: u64,
    ) -> Result<Vec<Bucket>, RoramError>;

    /// Writes `buckets` starting at `start_bucket` on `level`. Symmetric to `read_buckets`.
    fn write_buckets(
        &mut self,
        level: u32,
        start: u64,
        buckets: &[Bucket],
    ) -> Result<(), RoramError>;

    /// Constant byte size of one bucket, derived from the backend's parameters.
    fn bucket_byte_size(&self) -> usize;

    /// Advisory count of non-sequential request transitions observed so far.
    fn seek_count(&self) -> u64;
}

/// Tracks the byte offset immediately after the previous request and counts transitions to a
/// non-contiguous offset. Shared by `MemoryStorage` and `FileStorage`.
#[derive(Debug, Default)]
struct SeekTracker {
    last_offset: Option<u64>,
    seek_count: u64,
}

impl SeekTracker {
    fn observe(&mut self, offset: u64, request_bytes: u64) {
        if let Some(last) = self.last_offset {
            if last != offset {
                self.seek_count += 1;
            }
        }
        self.last_offset = Some(offset + request_bytes);
    }
}

fn level_offset(params: &Params, level: u32) -> u64 {
    let bucket_size = params.bucket_byte_size() as u64;
    (0..level).map(|j| (1u64 << j) * bucket_size).sum()
}

/// An in-memory storage backend: one contiguous byte buffer per tree level.
#[derive(Debug)]
pub struct MemoryStorage {
    params: Params,
    bucket_byte_size: usize,
    level_data: Vec<Vec<u8>>,
    tracker: SeekTracker,
}

impl MemoryStorage {
    /// Allocates zeroed storage for every level of a tree with `params.h` height.
    pub fn new(params: Params) -> Self {
        let bucket_byte_size = Bucket::serialized_size(&params);
        let level_data = (0..=params.h)
            .map(|j| vec![0u8; (1u64 << j) as usize * bucket_byte_size])
            .collect();
        Self {
            params,
            bucket_byte_size,
            level_data,
            tracker: SeekTracker::default(),
        }
    }
}

impl StorageBackend for MemoryStorage {
    fn read_buckets(
        &mut self,
        level: u32,
        start: u64,
        count: u64,
    ) -> Result<Vec<Bucket>, RoramError> {
        let bucket_size = self.bucket_byte_size as u64;
        let off = level_offset(&self.params, level) + start * bucket_size;
        self.tracker.observe(off, count * bucket_size);

        let data = &self.level_data[level as usize];
        let mut out = Vec::with_capacity(count as usize);
        for i in 0..count {
            let pos = ((start + i) as usize) * self.bucket_byte_size;
            let slice = data
                .get(pos..pos + self.bucket_byte_size)
                .ok_or_else(|| RoramError::StorageIo("read past end of level".into()))?;
            out.push(Bucket::deserialize(slice, &self.params));
        }
        Ok(out)
    }

    fn write_buckets(
        &mut self,
        level: u32,
        start: u64,
        buckets: &[Bucket],
    ) -> Result<(), RoramError> {
        let bucket_size = self.bucket_byte_size as u64;
        let off = level_offset(&self.params, level) + start * bucket_size;
        self.tracker.observe(off, buckets.len() as u64 * bucket_size);

        let data = &mut self.level_data[level as usize];
        for (i, bucket) in buckets.iter().enumerate() {
            let pos = ((start as usize) + i) * self.bucket_byte_size;
            let slice = data
                .get_mut(pos..pos + self.bucket_byte_size)
                .ok_or_else(|| RoramError::StorageIo("write past end of level".into()))?;
            bucket.serialize(slice, &self.params);
        }
        Ok(())
    }

    fn bucket_byte_size(&self) -> usize {
        self.bucket_byte_size
    }

    fn seek_count(&self) -> u64 {
        self.tracker.seek_count
    }
}

/// A single-file storage backend: all levels concatenated into one file, accessed with
/// positional I/O so that concurrent backends (one per sub-ORAM) never need to seek a shared
/// cursor.
#[derive(Debug)]
pub struct FileStorage {
    params: Params,
    bucket_byte_size: usize,
    file: File,
    tracker: SeekTracker,
}

impl FileStorage {
    /// Opens (creating if absent) the file at `path` and pre-allocates it to the full size
    /// required by `params`: `(2^{h+1} - 1) * bucket_byte_size` bytes.
    pub fn new(params: Params, path: impl AsRef<Path>) -> Result<Self, RoramError> {
        let bucket_byte_size = Bucket::serialized_size(&params);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let total_buckets: u64 = (0..=params.h).map(|j| 1u64 << j).sum();
        let total_bytes = total_buckets * bucket_byte_size as u64;
        if file.metadata()?.len() < total_bytes {
            file.set_len(total_bytes)?;
        }

        Ok(Self {
            params,
            bucket_byte_size,
            file,
            tracker: SeekTracker::default(),
        })
    }
}

impl StorageBackend for FileStorage {
    fn read_buckets(
        &mut self,
        level: u32,
        start: u64,
        count: u64,
    ) -> Result<Vec<Bucket>, RoramError> {
        let bucket_size = self.bucket_byte_size as u64;
        let off = level_offset(&self.params, level) + start * bucket_size;
        self.tracker.observe(off, count * bucket_size);

        let mut buf = vec![0u8; (count * bucket_size) as usize];
        self.file.read_exact_at(&mut buf, off)?;

        let mut out = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let pos = i * self.bucket_byte_size;
            out.push(Bucket::deserialize(
                &buf[pos..pos + self.bucket_byte_size],
                &self.params,
            ));
        }
        Ok(out)
    }

    fn write_buckets(
        &mut self,
        level: u32,
        start: u64,
        buckets: &[Bucket],
    ) -> Result<(), RoramError> {
        let bucket_size = self.bucket_byte_size as u64;
        let off = level_offset(&self.params, level) + start * bucket_size;
        self.tracker.observe(off, buckets.len() as u64 * bucket_size);

        let mut buf = vec![0u8; buckets.len() * self.bucket_byte_size];
        for (i, bucket) in buckets.iter().enumerate() {
            let pos = i * self.bucket_byte_size;
            bucket.serialize(&mut buf[pos..pos + self.bucket_byte_size], &self.params);
        }
        self.file.write_all_at(&buf, off)?;
        Ok(())
    }

    fn bucket_byte_size(&self) -> usize {
        self.bucket_byte_size
    }

    fn seek_count(&self) -> u64 {
        self.tracker.seek_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> Params {
        Params::new(16, 4, 3, 8).unwrap()
    }

    #[test]
    fn memory_storage_round_trips() {
        let params = test_params();
        let mut storage = MemoryStorage::new(params);
        let mut bucket = Bucket::empty(&params);
        bucket.blocks[0].a = 5;
        bucket.blocks[0].data = vec![0xAB; params.b];
        bucket.blocks[0].p = vec![1, 2, 3];

        storage.write_buckets(2, 1, std::slice::from_ref(&bucket)).unwrap();
        let read_back = storage.read_buckets(2, 1, 1).unwrap();
        assert_eq!(read_back[0], bucket);
    }

    #[test]
    fn memory_storage_counts_seeks() {
        let params = test_params();
        let mut storage = MemoryStorage::new(params);
        let buckets = vec![Bucket::empty(&params); 2];

        storage.write_buckets(2, 0, &buckets).unwrap(); // first request, no seek charged
        assert_eq!(storage.seek_count(), 0);
        storage.write_buckets(2, 2, &buckets).unwrap(); // contiguous continuation
        assert_eq!(storage.seek_count(), 0);
        storage.write_buckets(2, 0, &buckets).unwrap(); // jump backward: a seek
        assert_eq!(storage.seek_count(), 1);
    }

    #[test]
    fn file_storage_round_trips() {
        let params = test_params();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree0");
        let mut storage = FileStorage::new(params, &path).unwrap();

        let mut bucket = Bucket::empty(&params);
        bucket.blocks[0].a = 9;
        bucket.blocks[0].data = vec![0x42; params.b];
        bucket.blocks[0].p = vec![4, 5, 6];

        storage.write_buckets(3, 2, std::slice::from_ref(&bucket)).unwrap();
        let read_back = storage.read_buckets(3, 2, 1).unwrap();
        assert_eq!(read_back[0], bucket);
    }

    #[test]
    fn file_storage_preallocates_full_size() {
        let params = test_params();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree0");
        let storage = FileStorage::new(params, &path).unwrap();

        let total_buckets: u64 = (0..=params.h).map(|j| 1u64 << j).sum();
        let expected = total_buckets * storage.bucket_byte_size() as u64;
        assert_eq!(storage.file.metadata().unwrap().len(), expected);
    }
}
