//! Linker Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A linker error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for linking.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A node file listed by the graph (or the root node) doesn't exist.
    #[display("node file not found: {}", _0.display())]
    NodeNotFound(#[error(not(source))] PathBuf),
    /// A node or cache file exists but couldn't be read.
    #[display("could not read {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    /// Writing the file entry cache failed.
    #[display("could not save file entry cache")]
    Cache,
    /// Building the archive failed; the previous one is still in place.
    #[display("could not build archive")]
    Archive,
    /// Saving the archive's dependency record failed.
    #[display("could not save dependency record")]
    Dependency,
    #[display("could not start hashing threads")]
    ThreadPool,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Cache | Self::Archive | Self::Dependency)
    }
}
