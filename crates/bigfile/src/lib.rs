//! Content-addressed archives ("bigfiles").
//!
//! An archive is a payload of aligned file contents plus three tables: the
//! table of contents, a filename database and a hash database. Paths with
//! identical digests share one copy of their bytes unless the configuration
//! allows duplicates.

mod builder;
mod config;
mod endian;
pub mod error;
mod reader;
mod toc;
mod writer;

pub use crate::builder::ArchiveBuilder;
pub use crate::config::{BigfileConfig, Endian};
pub use crate::reader::ArchiveReader;
pub use crate::toc::{FLAG_COMPRESSED, HashDb, Instance, Toc, TocEntry};
pub use crate::writer::{ArchiveWriter, PayloadWriter, Placement, Simulator};
