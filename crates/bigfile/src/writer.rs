//! Placing payloads in an archive.
//!
//! [`PayloadWriter`] writes the payload file; [`Simulator`] computes the exact
//! same placements from file sizes alone, so a table of contents can be
//! regenerated without touching a multi-gigabyte payload.

use crate::config::BigfileConfig;
use crate::error::{ErrorKind, Result};
use databuild_storage::AtomicFile;
use exn::ResultExt;
use flate2::{Compression as GzCompression, write::GzEncoder};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Favour archive size over link time.
const GZIP_LEVEL: GzCompression = GzCompression::best();

/// Where a file ended up in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub offset: u64,
    /// Stored bytes, excluding alignment padding.
    pub size: u64,
    pub compressed: bool,
}

pub trait ArchiveWriter {
    /// Append one file, padded to the configured alignment.
    fn write_file(&mut self, path: &Path) -> Result<Placement>;

    /// Offset the next file will be placed at.
    fn position(&self) -> u64;
}

pub struct PayloadWriter<'a> {
    config: &'a BigfileConfig,
    file: AtomicFile,
    position: u64,
}
impl<'a> PayloadWriter<'a> {
    pub fn create(target: impl AsRef<Path>, config: &'a BigfileConfig) -> Result<Self> {
        let target = target.as_ref();
        let file = AtomicFile::with_capacity(target, config.read_buffer_size)
            .or_raise(|| ErrorKind::Write(target.to_path_buf()))?;
        Ok(Self { config, file, position: 0 })
    }

    /// Allocate the expected payload size before writing into it.
    pub fn reserve(&mut self, size: u64) -> Result<()> {
        let target = self.file.target().to_path_buf();
        self.file.set_len(size).or_raise(|| ErrorKind::Write(target))
    }

    /// Trim anything reserved but not written and hand back the uncommitted
    /// file.
    pub fn finish(mut self) -> Result<AtomicFile> {
        let target = self.file.target().to_path_buf();
        self.file.set_len(self.position).or_raise(|| ErrorKind::Write(target))?;
        Ok(self.file)
    }

    fn write_target(&self) -> ErrorKind {
        ErrorKind::Write(self.file.target().to_path_buf())
    }
}
impl ArchiveWriter for PayloadWriter<'_> {
    fn write_file(&mut self, path: &Path) -> Result<Placement> {
        let offset = self.position;
        let size = match self.config.compress_files {
            true => {
                let data = compress_file(path)?;
                self.file.write_all(&data).or_raise(|| self.write_target())?;
                data.len() as u64
            },
            false => {
                let mut source = File::open(path).or_raise(|| ErrorKind::Source(path.to_path_buf()))?;
                io::copy(&mut source, &mut self.file).map_err(ErrorKind::Io)?
            },
        };
        let end = offset + size;
        let aligned = self.config.align(end);
        io::copy(&mut io::repeat(0).take(aligned - end), &mut self.file).or_raise(|| self.write_target())?;
        self.position = aligned;
        tracing::trace!(path = %path.display(), offset, size, "Wrote payload");
        Ok(Placement { offset, size, compressed: self.config.compress_files })
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// Lays files out like [`PayloadWriter`] without writing anything.
pub struct Simulator<'a> {
    config: &'a BigfileConfig,
    position: u64,
}
impl<'a> Simulator<'a> {
    pub fn new(config: &'a BigfileConfig) -> Self {
        Self { config, position: 0 }
    }
}
impl ArchiveWriter for Simulator<'_> {
    fn write_file(&mut self, path: &Path) -> Result<Placement> {
        let offset = self.position;
        // Compressed sizes can't be known without compressing.
        let size = match self.config.compress_files {
            true => compress_file(path)?.len() as u64,
            false => fs::metadata(path).or_raise(|| ErrorKind::Source(path.to_path_buf()))?.len(),
        };
        self.position = self.config.align(offset + size);
        Ok(Placement { offset, size, compressed: self.config.compress_files })
    }

    fn position(&self) -> u64 {
        self.position
    }
}

fn compress_file(path: &Path) -> Result<Vec<u8>> {
    let data = fs::read(path).or_raise(|| ErrorKind::Source(PathBuf::from(path)))?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), GZIP_LEVEL);
    encoder.write_all(&data).or_raise(|| ErrorKind::Compression)?;
    encoder.finish().or_raise(|| ErrorKind::Compression)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(alignment: u64, compress_files: bool) -> BigfileConfig {
        BigfileConfig { file_alignment: alignment, compress_files, ..BigfileConfig::default() }
    }

    fn fixture(dir: &Path) -> Vec<PathBuf> {
        [("a.txt", vec![b'a'; 5]), ("b.txt", vec![b'b'; 32]), ("c.txt", vec![b'c'; 33])]
            .into_iter()
            .map(|(name, data)| {
                let path = dir.join(name);
                fs::write(&path, data).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_payload_is_padded_to_alignment() {
        let temp_dir = tempfile::tempdir().unwrap();
        let files = fixture(temp_dir.path());
        let config = config(16, false);
        let target = temp_dir.path().join("Game.gda");
        let mut writer = PayloadWriter::create(&target, &config).unwrap();
        let placements: Vec<_> = files.iter().map(|path| writer.write_file(path).unwrap()).collect();
        assert_eq!(writer.position(), 16 + 32 + 48);
        writer.finish().unwrap().commit().unwrap();

        let offsets: Vec<_> = placements.iter().map(|p| (p.offset, p.size)).collect();
        assert_eq!(offsets, [(0, 5), (16, 32), (48, 33)]);
        let payload = fs::read(&target).unwrap();
        assert_eq!(payload.len(), 96);
        assert_eq!(&payload[..5], b"aaaaa");
        assert!(payload[5..16].iter().all(|b| *b == 0));
        assert_eq!(&payload[48..81], &[b'c'; 33]);
    }

    #[test]
    fn test_simulator_matches_writer() {
        let temp_dir = tempfile::tempdir().unwrap();
        let files = fixture(temp_dir.path());
        for compress in [false, true] {
            let config = config(16, compress);
            let mut simulator = Simulator::new(&config);
            let mut writer = PayloadWriter::create(temp_dir.path().join("Game.gda"), &config).unwrap();
            for path in &files {
                assert_eq!(simulator.write_file(path).unwrap(), writer.write_file(path).unwrap());
            }
            assert_eq!(simulator.position(), writer.position());
        }
    }

    #[test]
    fn test_reserved_space_is_trimmed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let files = fixture(temp_dir.path());
        let config = config(16, false);
        let target = temp_dir.path().join("Game.gda");
        let mut writer = PayloadWriter::create(&target, &config).unwrap();
        writer.reserve(1024).unwrap();
        writer.write_file(&files[0]).unwrap();
        writer.finish().unwrap().commit().unwrap();
        assert_eq!(fs::metadata(&target).unwrap().len(), 16);
    }

    #[test]
    fn test_missing_source_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = config(16, false);
        let missing = temp_dir.path().join("missing.bin");
        assert!(Simulator::new(&config).write_file(&missing).is_err());
        let mut writer = PayloadWriter::create(temp_dir.path().join("Game.gda"), &config).unwrap();
        let err = writer.write_file(&missing).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Source(path) if path == &missing));
    }
}
