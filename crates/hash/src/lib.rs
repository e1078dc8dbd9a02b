//! Digests used for change detection across the data build tools.
//!
//! Equality of two [`Digest`]s is the *only* test anything downstream uses to
//! decide whether a file changed: there is no byte comparison anywhere.

mod digest;
pub mod error;
mod hasher;
mod pool;

pub use crate::digest::Digest;
pub use crate::hasher::{HashMethod, Hashed, file_id, hash_bytes, hash_file, hash_timestamp};
pub use crate::pool::HashPool;
