// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Shared binary encode/decode helpers used by the wire grammar.

use std::io::{Read, Write};

/// Error during serialization.
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error.
    Io(std::io::Error),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EncodeError({})",
            match self {
                Self::Io(e) => e.to_string(),
            }
        )
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
        }
    }
}

/// Error during deserialization.
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error.
    Io(std::io::Error),

    /// The byte stream did not describe a value of the expected shape.
    InvalidFormat(&'static str),

    /// A tag byte did not match any known variant.
    InvalidTag(u8),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "DecodeError(io: {e})"),
            Self::InvalidFormat(msg) => write!(f, "DecodeError(invalid format: {msg})"),
            Self::InvalidTag(tag) => write!(f, "DecodeError(invalid tag: {tag})"),
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for DecodeError {}

/// Trait for the wire grammar / on-disk block codec.
pub trait Encode {
    /// Serializes into a writer.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into a freshly allocated vector.
    fn encode_into_vec(&self) -> Vec<u8> {
        let mut v = vec![];
        self.encode_into(&mut v).expect("writing to a Vec cannot fail");
        v
    }
}

/// Trait for the wire grammar / on-disk block codec.
pub trait Decode {
    /// Deserializes from a reader.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}
