//! Dependency Error Types
//!
//! Most problems with persisted records are recovered from by whoever loads
//! them (a record that can't be read is the same as no record: rebuild). These
//! kinds exist so the loader can say *why* in the logs.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A dependency tracking error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for dependency tracking operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No persisted record exists.
    #[display("no dependency record at {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The persisted record tracks another main file, e.g. one in a folder
    /// that has since moved.
    #[display("dependency record at {} tracks a different main file", _0.display())]
    OtherMain(#[error(not(source))] PathBuf),
    /// A persisted record couldn't be parsed.
    #[display("malformed dependency record: {_0}")]
    Malformed(#[error(not(source))] String),
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Walking, reading or committing files failed.
    #[display("storage error")]
    Storage,
    /// A configured exclusion pattern is invalid.
    #[display("invalid dependency configuration")]
    Config,
}

impl ErrorKind {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Storage)
    }
}
