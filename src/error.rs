// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{DecodeError, EncodeError},
    version::FormatVersion,
};

/// Errors that can occur while operating the engine.
///
/// Expected failures (address not found, ownership refused) are *not*
/// represented here; they are returned as `bool`/`Option` from the engine
/// methods that can fail for those reasons. This enum is reserved for I/O and
/// encode/decode failures at the persistence boundary.
#[derive(Debug)]
pub enum Error {
    /// I/O error from the block store.
    Io(std::io::Error),

    /// Serialization failed.
    Encode(EncodeError),

    /// Deserialization failed.
    Decode(DecodeError),

    /// A block carried a format version this build does not know how to read.
    InvalidVersion(FormatVersion),

    /// A referenced block could not be found in the block store.
    ///
    /// Unlike a missing tumbler address (an expected failure), this means the
    /// persistence layer itself is inconsistent with in-core state, which is
    /// an invariant violation.
    MissingBlock(crate::block_store::BlockId),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EngineError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Crate-wide result type for fallible, non-expected-failure operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Aborts the process after logging an invariant violation, mirroring the
/// original backend's `gerror`: there is no recovery path once a tree or
/// tumbler is found to be in an impossible state.
#[track_caller]
pub fn gerror(msg: &str) -> ! {
    log::error!("invariant violation: {msg}");
    panic!("invariant violation: {msg}");
}
