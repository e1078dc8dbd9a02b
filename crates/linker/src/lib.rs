//! Incremental archive linking.
//!
//! A link reads the node graph rooted at `<dst>/<name><node extension>`,
//! reconciles the files it lists against the file entry cache, and rebuilds
//! the archive in the publish folder only when something changed.

mod entry;
pub mod error;
mod link;
mod node;

pub use crate::entry::{FileEntry, FileEntryCache};
pub use crate::link::{LinkOutcome, Linker};
pub use crate::node::NodeGraph;
