// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Error types for the rORAM crate.

use thiserror::Error;

/// The error type returned by fallible rORAM operations.
#[derive(Error, Debug)]
pub enum RoramError {
    /// A caller supplied an invalid parameter or out-of-range request.
    #[error("bad parameter: {0}")]
    BadParameter(String),

    /// A storage backend failed to complete a read or write.
    #[error("storage I/O error: {0}")]
    StorageIo(String),

    /// A crypto provider failed to initialize (e.g. a malformed key).
    #[error("crypto initialization error: {0}")]
    CryptoInit(String),

    /// An internal invariant was violated at runtime.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl From<std::io::Error> for RoramError {
    fn from(value: std::io::Error) -> Self {
        RoramError::StorageIo(value.to_string())
    }
}

impl From<std::num::TryFromIntError> for RoramError {
    fn from(value: std::num::TryFromIntError) -> Self {
        RoramError::Internal(value.to_string())
    }
}
