use crate::config::BigfileConfig;
use crate::error::{ErrorKind, Result};
use crate::toc::{Instance, Toc, TocEntry};
use exn::ResultExt;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Reads payloads back out of a committed archive.
pub struct ArchiveReader {
    path: PathBuf,
    inner: BufReader<File>,
}
impl ArchiveReader {
    pub fn open(dir: impl AsRef<Path>, name: &str, config: &BigfileConfig) -> Result<Self> {
        let path = config.payload_path(dir, name);
        let file = File::open(&path).or_raise(|| ErrorKind::Source(path.clone()))?;
        Ok(Self { inner: BufReader::with_capacity(config.read_buffer_size.max(1), file), path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that the payload is the one `toc` was written with.
    pub fn verify(&self, toc: &Toc) -> Result<()> {
        let len = self.inner.get_ref().metadata().map_err(ErrorKind::Io)?.len();
        if len != toc.payload_len() {
            exn::bail!(ErrorKind::malformed(format!(
                "{} is {len} bytes, its table of contents expects {}",
                self.path.display(),
                toc.payload_len()
            )));
        }
        Ok(())
    }

    /// The original bytes of one instance, decompressed if needed.
    pub fn read(&mut self, entry: &TocEntry, instance: &Instance) -> Result<Vec<u8>> {
        self.inner.seek(SeekFrom::Start(instance.offset)).map_err(ErrorKind::Io)?;
        let mut stored = Vec::new();
        let read = (&mut self.inner).take(entry.size).read_to_end(&mut stored).map_err(ErrorKind::Io)?;
        if read as u64 != entry.size {
            exn::bail!(ErrorKind::malformed(format!(
                "payload at {} is {} bytes short",
                instance.offset,
                entry.size - read as u64
            )));
        }
        if !entry.compressed {
            return Ok(stored);
        }
        let mut data = Vec::new();
        GzDecoder::new(stored.as_slice()).read_to_end(&mut data).or_raise(|| ErrorKind::Compression)?;
        Ok(data)
    }
}
