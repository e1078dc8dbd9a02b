//! Write-then-rename file commits.
//!
//! Build artifacts (archives, tables of contents, dependency records and
//! caches) are always written to a temporary file in the target's directory
//! and only renamed over the target once the write completed. An aborted
//! build therefore leaves the previously committed file untouched; the
//! temporary file is removed when an uncommitted [`AtomicFile`] is dropped.

use crate::error::{ErrorKind, Result};
use std::fs;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A file being written that will replace `target` on [`commit`](Self::commit).
pub struct AtomicFile {
    target: PathBuf,
    inner: BufWriter<NamedTempFile>,
}
impl AtomicFile {
    /// Open a temporary file next to `target`, creating parent directories
    /// as needed.
    pub fn create(target: impl AsRef<Path>) -> Result<Self> {
        Self::with_capacity(target, 64 * 1024)
    }

    /// Same as [`create`](Self::create) with an explicit write buffer size.
    pub fn with_capacity(target: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| ErrorKind::from_io(e, &dir))?;
        let temp = NamedTempFile::new_in(&dir).map_err(|e| ErrorKind::from_io(e, &dir))?;
        Ok(Self { target, inner: BufWriter::with_capacity(capacity.max(1), temp) })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Bytes written so far.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position().map_err(ErrorKind::Io)?)
    }

    /// Grow or truncate the file to `size` bytes. The write position stays
    /// where it is.
    pub fn set_len(&mut self, size: u64) -> Result<()> {
        self.inner.flush().map_err(ErrorKind::Io)?;
        self.inner.get_ref().as_file().set_len(size).map_err(ErrorKind::Io)?;
        Ok(())
    }

    /// Flush, sync and rename the temporary file over the target.
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        let temp = self.inner.into_inner().map_err(|e| ErrorKind::Io(e.into_error()))?;
        temp.as_file().sync_all().map_err(ErrorKind::Io)?;
        temp.persist(&target).map_err(|e| {
            tracing::warn!(target = %target.display(), error = %e.error, "Failed to replace file");
            exn::Exn::from(ErrorKind::Commit(target.clone()))
        })?;
        tracing::trace!(target = %target.display(), "Committed file");
        Ok(())
    }
}
impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Atomically replace `target` with `data`.
pub fn write_atomic(target: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let mut file = AtomicFile::create(target)?;
    file.write_all(data).map_err(ErrorKind::Io)?;
    file.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_replaces_target() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("Publish/Game.gdt");
        write_atomic(&target, b"first").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"first");
        write_atomic(&target, b"second").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
    }

    #[test]
    fn test_uncommitted_write_leaves_target_alone() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("Game.gda");
        write_atomic(&target, b"committed").unwrap();
        {
            let mut file = AtomicFile::create(&target).unwrap();
            file.write_all(b"half a payl").unwrap();
            // Dropped without commit, like a build that hit an I/O error.
        }
        assert_eq!(fs::read(&target).unwrap(), b"committed");
        // And the temporary file is gone again.
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_position_tracks_writes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut file = AtomicFile::create(temp_dir.path().join("Game.gda")).unwrap();
        file.set_len(4096).unwrap();
        assert_eq!(file.position().unwrap(), 0);
        file.write_all(&[7u8; 10]).unwrap();
        assert_eq!(file.position().unwrap(), 10);
        file.set_len(10).unwrap();
        file.commit().unwrap();
        assert_eq!(fs::read(temp_dir.path().join("Game.gda")).unwrap(), [7u8; 10]);
    }
}
