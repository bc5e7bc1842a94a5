// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A range-aware Oblivious RAM (rORAM): a family of Path-ORAM-style trees, one per range-size
//! class, laid out so that a request of size `2^i` is served by `i`'s own tree as a contiguous
//! run of buckets per level rather than `O(log N)` scattered accesses.
//!
//! The top-level entry point is [`RoramCoordinator`], which owns one [`SubOram`] per range
//! class and exposes [`RoramCoordinator::access`] for reads and writes.

#![warn(clippy::cargo, clippy::doc_markdown, missing_docs, rustdoc::all)]

mod block;
mod coordinator;
mod crypto;
mod error;
mod params;
mod position_map;
mod storage;
mod sub_oram;

pub use block::{Block, Bucket, INVALID_ADDR};
pub use coordinator::{Op, RoramCoordinator};
pub use crypto::{ChaChaCrypto, CryptoProvider, NoOpCrypto};
pub use error::RoramError;
pub use params::Params;
pub use position_map::PositionMap;
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
pub use sub_oram::SubOram;
