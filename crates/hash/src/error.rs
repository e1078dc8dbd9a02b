//! Hash Error Types

use derive_more::{Display, Error};

/// A hashing error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for hashing operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Text that was supposed to be a digest isn't one.
    #[display("invalid digest: {_0:?}")]
    InvalidDigest(#[error(not(source))] String),
    /// The worker pool could not be started.
    #[display("could not build hashing thread pool")]
    ThreadPool,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
