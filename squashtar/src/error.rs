//! Errors

use std::{io, string};

use thiserror::Error;

/// Closed error enumeration used across every component of the library.
///
/// This maps onto the error taxonomy shared by the SquashFS codec, the tar
/// codec, the fstree builders, and the block processor: parsers never trust
/// on-disk sizes, so most failure paths land in [`SquashTarError::Corrupted`]
/// or [`SquashTarError::OutOfBounds`] rather than panicking.
#[derive(Error, Debug)]
pub enum SquashTarError {
    #[error("allocation failed")]
    Alloc,

    #[error("std io error: {0}")]
    Io(#[from] io::Error),

    #[error("deku error: {0:?}")]
    Deku(#[from] deku::DekuError),

    #[error("string error: {0:?}")]
    StringUtf8(#[from] string::FromUtf8Error),

    #[error("string error: {0:?}")]
    StrUtf8(#[from] std::str::Utf8Error),

    /// A violated on-disk invariant: bad magic, a table offset outside the
    /// file, a directory count that doesn't add up, a tar checksum mismatch.
    #[error("corrupted or invalid image: {0}")]
    Corrupted(String),

    /// A known construct the implementation deliberately refuses, e.g. an
    /// xattr prefix outside `{user, trusted, security}` or a disabled
    /// compressor feature.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Arithmetic or field-width overflow (e.g. a block count that would not
    /// fit the on-disk field).
    #[error("overflow: {0}")]
    Overflow(String),

    /// A read or seek fell outside the caller-supplied `[start, limit)`
    /// window.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    #[error("not a regular file: {0}")]
    NotFile(String),

    #[error("no such entry: {0}")]
    NoEntry(String),

    /// API misuse, e.g. calling a directory iterator's `next` while its file
    /// stream is still open.
    #[error("api misuse: {0}")]
    Sequence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SquashTarError {
    /// Shorthand for the common "an on-disk invariant doesn't hold" case.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }
}

impl From<SquashTarError> for io::Error {
    fn from(value: SquashTarError) -> Self {
        use SquashTarError::*;
        match value {
            Io(io) => io,
            Deku(e) => e.into(),
            StringUtf8(e) => Self::new(io::ErrorKind::InvalidData, e),
            StrUtf8(e) => Self::new(io::ErrorKind::InvalidData, e),
            e @ Alloc => Self::new(io::ErrorKind::OutOfMemory, e),
            e @ Unsupported(_) => Self::new(io::ErrorKind::Unsupported, e),
            e @ NoEntry(_) => Self::new(io::ErrorKind::NotFound, e),
            e @ (Corrupted(_)
            | Overflow(_)
            | OutOfBounds(_)
            | NotFile(_)
            | Sequence(_)
            | Internal(_)) => Self::new(io::ErrorKind::InvalidData, e),
        }
    }
}

pub type Result<T> = std::result::Result<T, SquashTarError>;
