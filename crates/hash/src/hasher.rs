use crate::digest::Digest;
use databuild_storage::logical_name;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::time::SystemTime;
use time::OffsetDateTime;

/// Outcome of hashing something on disk.
///
/// Hashing never fails loudly: callers treat anything other than
/// [`Hashed::Digest`] as "definitely changed".
#[derive(Debug)]
pub enum Hashed {
    Digest(Digest),
    NotFound,
    Io(std::io::Error),
}
impl Hashed {
    /// The digest, or [`Digest::EMPTY`] when nothing could be hashed.
    pub fn digest(&self) -> Digest {
        match self {
            Self::Digest(digest) => *digest,
            Self::NotFound | Self::Io(_) => Digest::EMPTY,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Digest(_))
    }

    fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            IoErrorKind::NotFound => Self::NotFound,
            _ => Self::Io(err),
        }
    }
}

/// How a tracked file's [`Digest`] is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashMethod {
    /// Encode the last write time. Cheap, and what most records use.
    #[default]
    Timestamp,
    /// Hash the full file contents.
    ContentHash,
}
impl HashMethod {
    pub fn digest(self, path: impl AsRef<Path>) -> Hashed {
        let path = path.as_ref();
        match self {
            Self::ContentHash => hash_file(path),
            Self::Timestamp => match std::fs::metadata(path) {
                Ok(metadata) if metadata.is_file() => match metadata.modified() {
                    Ok(modified) => Hashed::Digest(hash_timestamp(modified)),
                    Err(e) => Hashed::Io(e),
                },
                Ok(_) => Hashed::NotFound,
                Err(e) => Hashed::from_io(e),
            },
        }
    }
}

pub fn hash_bytes(data: &[u8]) -> Digest {
    Digest::from_blake3(blake3::hash(data))
}

/// Stream a file through BLAKE3.
pub fn hash_file(path: impl AsRef<Path>) -> Hashed {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => return Hashed::from_io(e),
    };
    let mut hasher = blake3::Hasher::new();
    match hasher.update_reader(file) {
        Ok(_) => Hashed::Digest(Digest::from_blake3(hasher.finalize())),
        // Directories open fine on some platforms and only fail on read.
        Err(e) if e.kind() == IoErrorKind::IsADirectory => Hashed::NotFound,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Could not hash file");
            Hashed::Io(e)
        },
    }
}

/// Encode a timestamp in digest form: eight zero bytes, then the signed count
/// of 100ns ticks since the Unix epoch, big-endian.
///
/// Not a hash at all, but it compares the same way and keeps timestamp and
/// content records interchangeable on disk.
pub fn hash_timestamp(at: SystemTime) -> Digest {
    let ticks = databuild_storage::ticks(OffsetDateTime::from(at));
    let mut bytes = [0; Digest::LEN];
    bytes[8..].copy_from_slice(&ticks.to_be_bytes());
    Digest::from_bytes(bytes)
}

/// Path-derived identity of a logical file, as stored in archive tables.
///
/// The path is normalised to its `/`-separated spelling first, so the same
/// asset gets the same id whichever platform linked it.
pub fn file_id(path: impl AsRef<Path>) -> u64 {
    let hash = blake3::hash(logical_name(path).as_bytes());
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}
