//! Local filesystem primitives shared by the data build tools.
//!
//! Everything here is synchronous: the tools spend their time hashing and
//! copying local files, and the parallel parts are handed to a thread pool by
//! the callers.

mod atomic;
pub mod error;
mod models;
mod path;
mod walk;

pub use crate::atomic::{AtomicFile, write_atomic};
pub use crate::models::{FileInfo, stat, ticks};
pub use crate::path::{logical_name, validate as validate_path};
pub use crate::walk::{WalkFilter, Walker};
