//! Archive Error Types
//!
//! Unlike dependency records, nothing here is recovered from: a failed write
//! aborts the whole save and the previously committed archive stays in place.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A queued file couldn't be read while packing it.
    #[display("could not read {}", _0.display())]
    Source(#[error(not(source))] PathBuf),
    /// An artifact couldn't be written or committed.
    #[display("could not write {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
    /// A table of contents, filename or hash database couldn't be parsed.
    #[display("malformed archive table: {_0}")]
    Malformed(#[error(not(source))] String),
    /// Compressing or decompressing a payload failed.
    #[display("compression failed")]
    Compression,
    #[display("I/O error: {_0}")]
    Io(IoError),
}

impl ErrorKind {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Source(_) | Self::Write(_) | Self::Io(_))
    }
}
