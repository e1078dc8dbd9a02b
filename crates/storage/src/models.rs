//! Storage models.

use crate::error::{ErrorKind, Result};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Number of 100ns ticks in a second.
const TICKS_PER_SECOND: i128 = 10_000_000;

/// File metadata gathered from the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Path the file was found at (relative when produced by a walk)
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self { path: path.into(), size, modified }
    }

    pub(crate) fn from_metadata(path: impl Into<PathBuf>, metadata: &Metadata) -> Result<Self> {
        let path = path.into();
        let modified = metadata.modified().map_err(|e| ErrorKind::from_io(e, &path))?.into();
        Ok(Self::new(path, metadata.len(), modified))
    }

    /// Last write time as 100ns ticks since the Unix epoch.
    pub fn ticks(&self) -> i64 {
        ticks(self.modified)
    }
}

/// Convert a timestamp into 100ns ticks since the Unix epoch.
pub fn ticks(at: OffsetDateTime) -> i64 {
    let ticks = at.unix_timestamp_nanos() / (1_000_000_000 / TICKS_PER_SECOND);
    // Clamped; nothing on disk is going to be dated 29,000 years out.
    ticks.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Stat a file on the local filesystem.
///
/// Returns `Ok(None)` when nothing exists at `path`; directories and other
/// non-files are reported as missing too, since none of the callers can
/// track them.
pub fn stat(path: impl AsRef<Path>) -> Result<Option<FileInfo>> {
    let path = path.as_ref();
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(Some(FileInfo::from_metadata(path, &metadata)?)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ErrorKind::from_io(e, path).into()),
    }
}
