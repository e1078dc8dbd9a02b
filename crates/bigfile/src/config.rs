use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Byte order of every multi-byte field in the archive tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// How archives are laid out and named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BigfileConfig {
    pub payload_extension: String,
    pub toc_extension: String,
    pub filename_db_extension: String,
    pub hash_db_extension: String,
    pub node_extension: String,
    pub endian: Endian,
    /// Every payload starts at a multiple of this many bytes.
    pub file_alignment: u64,
    /// Write identical content once per logical path instead of once in total.
    pub allow_duplicate_files: bool,
    /// Gzip payloads before writing them.
    pub compress_files: bool,
    pub read_buffer_size: usize,
}
impl Default for BigfileConfig {
    fn default() -> Self {
        Self {
            payload_extension: ".gda".to_string(),
            toc_extension: ".gdt".to_string(),
            filename_db_extension: ".gdf".to_string(),
            hash_db_extension: ".gdh".to_string(),
            node_extension: ".gdn".to_string(),
            endian: Endian::Little,
            file_alignment: 2048,
            allow_duplicate_files: false,
            compress_files: false,
            read_buffer_size: 8 * 1024 * 1024,
        }
    }
}
impl BigfileConfig {
    /// Round `offset` up to the next multiple of the file alignment.
    pub fn align(&self, offset: u64) -> u64 {
        let alignment = self.file_alignment.max(1);
        offset.div_ceil(alignment) * alignment
    }

    pub fn payload_path(&self, dir: impl AsRef<Path>, name: &str) -> PathBuf {
        artifact(dir.as_ref(), name, &self.payload_extension)
    }

    pub fn toc_path(&self, dir: impl AsRef<Path>, name: &str) -> PathBuf {
        artifact(dir.as_ref(), name, &self.toc_extension)
    }

    pub fn filename_db_path(&self, dir: impl AsRef<Path>, name: &str) -> PathBuf {
        artifact(dir.as_ref(), name, &self.filename_db_extension)
    }

    pub fn hash_db_path(&self, dir: impl AsRef<Path>, name: &str) -> PathBuf {
        artifact(dir.as_ref(), name, &self.hash_db_extension)
    }

    pub fn node_path(&self, dir: impl AsRef<Path>, name: &str) -> PathBuf {
        artifact(dir.as_ref(), name, &self.node_extension)
    }
}

fn artifact(dir: &Path, name: &str, extension: &str) -> PathBuf {
    dir.join(format!("{name}{extension}"))
}
