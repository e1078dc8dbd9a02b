//! The tables written next to an archive payload.
//!
//! Three artifacts describe a payload, each a flat run of fixed-width fields
//! in the configured byte order:
//!
//! - the table of contents: `u32` entry count, `u64` payload length, then
//!   per entry `u64 size`,
//!   `u32 flags`, `u32` instance count and per instance `u64 file id`,
//!   `u64 offset`, `u32 filename index`, `u32` reserved;
//! - the filename database: `u32` count, per name `u64 file id`,
//!   `u32 string offset`, `u32 byte length`, then the string block
//!   (NUL-terminated, each string padded to 4 bytes);
//! - the hash database: `u32` count, then `(digest, u32 toc index)` pairs
//!   sorted by digest.
//!
//! An entry is one unique payload; its instances are the logical paths that
//! resolve to it. The payload length lets a reader tell whether a payload
//! and a table of contents were written together.

use crate::config::{BigfileConfig, Endian};
use crate::endian::{ByteReader, ByteWriter};
use crate::error::{ErrorKind, Result};
use databuild_hash::{Digest, file_id};
use databuild_storage::logical_name;
use exn::ResultExt;
use std::fs;
use std::path::Path;

pub const FLAG_COMPRESSED: u32 = 1;

/// One logical path resolving to a [`TocEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instance {
    pub file_id: u64,
    pub offset: u64,
    pub filename_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// Bytes stored in the payload, after compression if any.
    pub size: u64,
    pub compressed: bool,
    pub instances: Vec<Instance>,
}

/// Digest to TOC index, sorted for binary search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashDb {
    entries: Vec<(Digest, u32)>,
}
impl HashDb {
    pub fn new(entries: impl IntoIterator<Item = (Digest, u32)>) -> Self {
        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort_by_key(|(digest, _)| *digest);
        Self { entries }
    }

    pub fn lookup(&self, digest: &Digest) -> Option<u32> {
        let index = self.entries.binary_search_by_key(digest, |(d, _)| *d).ok()?;
        Some(self.entries[index].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Digest, u32)> {
        self.entries.iter()
    }

    fn encode(&self, endian: Endian) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new(endian);
        writer.len(self.entries.len())?;
        for (digest, index) in &self.entries {
            writer.bytes(digest.as_bytes());
            writer.u32(*index);
        }
        Ok(writer.into_inner())
    }

    fn decode(bytes: &[u8], endian: Endian) -> Result<Self> {
        let mut reader = ByteReader::new(bytes, endian, "hash database");
        let count = reader.u32()?;
        let mut entries = Vec::new();
        for _ in 0..count {
            let mut digest = [0; Digest::LEN];
            digest.copy_from_slice(reader.take(Digest::LEN)?);
            entries.push((Digest::from_bytes(digest), reader.u32()?));
        }
        reader.finish()?;
        if !entries.is_sorted_by_key(|(digest, _)| *digest) {
            exn::bail!(ErrorKind::malformed("hash database is not sorted"));
        }
        Ok(Self { entries })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toc {
    entries: Vec<TocEntry>,
    filenames: Vec<String>,
    hash_db: HashDb,
    payload_len: u64,
}
impl Toc {
    pub(crate) fn new(entries: Vec<TocEntry>, filenames: Vec<String>, hash_db: HashDb, payload_len: u64) -> Self {
        Self { entries, filenames, hash_db, payload_len }
    }

    /// Length of the payload these tables describe, padding included.
    pub fn payload_len(&self) -> u64 {
        self.payload_len
    }

    pub fn entries(&self) -> &[TocEntry] {
        &self.entries
    }

    pub fn filenames(&self) -> &[String] {
        &self.filenames
    }

    pub fn hash_db(&self) -> &HashDb {
        &self.hash_db
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn filename(&self, instance: &Instance) -> Option<&str> {
        self.filenames.get(instance.filename_index as usize).map(String::as_str)
    }

    /// Find the entry and instance a logical path resolves to.
    pub fn find(&self, path: impl AsRef<Path>) -> Option<(&TocEntry, &Instance)> {
        let name = logical_name(path);
        let id = file_id(&name);
        self.entries.iter().find_map(|entry| {
            entry
                .instances
                .iter()
                .find(|instance| instance.file_id == id && self.filename(instance) == Some(name.as_str()))
                .map(|instance| (entry, instance))
        })
    }

    /// Find the entry holding content with this digest.
    pub fn lookup(&self, digest: &Digest) -> Option<&TocEntry> {
        self.entries.get(self.hash_db.lookup(digest)? as usize)
    }

    pub fn encode_toc(&self, endian: Endian) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new(endian);
        writer.len(self.entries.len())?;
        writer.u64(self.payload_len);
        for entry in &self.entries {
            writer.u64(entry.size);
            writer.u32(if entry.compressed { FLAG_COMPRESSED } else { 0 });
            writer.len(entry.instances.len())?;
            for instance in &entry.instances {
                writer.u64(instance.file_id);
                writer.u64(instance.offset);
                writer.u32(instance.filename_index);
                writer.u32(0);
            }
        }
        Ok(writer.into_inner())
    }

    pub fn encode_filenames(&self, endian: Endian) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new(endian);
        let mut block = Vec::new();
        writer.len(self.filenames.len())?;
        for name in &self.filenames {
            writer.u64(file_id(name));
            writer.len(block.len())?;
            writer.len(name.len())?;
            block.extend_from_slice(name.as_bytes());
            block.push(0);
            block.resize(block.len().next_multiple_of(4), 0);
        }
        writer.bytes(&block);
        Ok(writer.into_inner())
    }

    pub fn encode_hash_db(&self, endian: Endian) -> Result<Vec<u8>> {
        self.hash_db.encode(endian)
    }

    pub fn decode(toc: &[u8], filenames: &[u8], hash_db: &[u8], endian: Endian) -> Result<Self> {
        let filenames = decode_filenames(filenames, endian)?;
        let hash_db = HashDb::decode(hash_db, endian)?;

        let mut reader = ByteReader::new(toc, endian, "table of contents");
        let count = reader.u32()?;
        let payload_len = reader.u64()?;
        let mut entries = Vec::new();
        for _ in 0..count {
            let size = reader.u64()?;
            let flags = reader.u32()?;
            let mut instances = Vec::new();
            for _ in 0..reader.u32()? {
                let instance = Instance { file_id: reader.u64()?, offset: reader.u64()?, filename_index: reader.u32()? };
                let _reserved = reader.u32()?;
                if instance.filename_index as usize >= filenames.len() {
                    exn::bail!(ErrorKind::malformed(format!("filename index {} out of range", instance.filename_index)));
                }
                if instance.offset.checked_add(size).is_none_or(|end| end > payload_len) {
                    exn::bail!(ErrorKind::malformed(format!("entry at {} runs past the payload", instance.offset)));
                }
                instances.push(instance);
            }
            entries.push(TocEntry { size, compressed: flags & FLAG_COMPRESSED != 0, instances });
        }
        reader.finish()?;
        if let Some((digest, index)) = hash_db.iter().find(|(_, index)| *index as usize >= entries.len()) {
            exn::bail!(ErrorKind::malformed(format!("hash {digest} points past the last entry ({index})")));
        }
        Ok(Self { entries, filenames, hash_db, payload_len })
    }

    /// Read the tables of a committed archive back.
    pub fn load(dir: impl AsRef<Path>, name: &str, config: &BigfileConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let read = |path: std::path::PathBuf| fs::read(&path).or_raise(|| ErrorKind::Source(path.clone()));
        let toc = read(config.toc_path(dir, name))?;
        let filenames = read(config.filename_db_path(dir, name))?;
        let hash_db = read(config.hash_db_path(dir, name))?;
        Self::decode(&toc, &filenames, &hash_db, config.endian)
    }
}

fn decode_filenames(bytes: &[u8], endian: Endian) -> Result<Vec<String>> {
    let mut reader = ByteReader::new(bytes, endian, "filename database");
    let count = reader.u32()?;
    let mut headers = Vec::new();
    for _ in 0..count {
        headers.push((reader.u64()?, reader.u32()? as usize, reader.u32()? as usize));
    }
    let block = reader.rest();
    let mut names = Vec::with_capacity(headers.len());
    for (id, offset, len) in headers {
        let bytes = offset.checked_add(len).and_then(|end| block.get(offset..end));
        let name = bytes.and_then(|bytes| std::str::from_utf8(bytes).ok());
        let Some(name) = name else {
            exn::bail!(ErrorKind::malformed(format!("filename at {offset} is out of range or not UTF-8")));
        };
        if file_id(name) != id {
            exn::bail!(ErrorKind::malformed(format!("file id of {name} doesn't match its name")));
        }
        names.push(name.to_string());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use databuild_hash::hash_bytes;
    use rstest::rstest;

    fn sample() -> Toc {
        let filenames = vec!["Cars/a.mesh".to_string(), "Cars/b.mesh".to_string(), "Fonts/ui.font".to_string()];
        let instance = |index: u32, offset| Instance { file_id: file_id(&filenames[index as usize]), offset, filename_index: index };
        let entries = vec![
            TocEntry { size: 10, compressed: false, instances: vec![instance(0, 0), instance(1, 0)] },
            TocEntry { size: 3, compressed: true, instances: vec![instance(2, 16)] },
        ];
        let hash_db = HashDb::new([(hash_bytes(b"mesh"), 0), (hash_bytes(b"font"), 1)]);
        Toc::new(entries, filenames, hash_db, 32)
    }

    #[rstest]
    #[case(Endian::Little)]
    #[case(Endian::Big)]
    fn test_tables_read_back(#[case] endian: Endian) {
        let toc = sample();
        let decoded = Toc::decode(
            &toc.encode_toc(endian).unwrap(),
            &toc.encode_filenames(endian).unwrap(),
            &toc.encode_hash_db(endian).unwrap(),
            endian,
        )
        .unwrap();
        assert_eq!(decoded, toc);
    }

    #[test]
    fn test_byte_order_applies_to_every_field() {
        let toc = sample();
        let little = toc.encode_toc(Endian::Little).unwrap();
        let big = toc.encode_toc(Endian::Big).unwrap();
        assert_eq!(little.len(), big.len());
        assert_eq!(&little[..4], &[2, 0, 0, 0]);
        assert_eq!(&big[..4], &[0, 0, 0, 2]);
        // Decoding with the wrong byte order doesn't silently succeed.
        let filenames = toc.encode_filenames(Endian::Little).unwrap();
        let hash_db = toc.encode_hash_db(Endian::Little).unwrap();
        assert!(Toc::decode(&little, &filenames, &hash_db, Endian::Big).is_err());
    }

    #[test]
    fn test_entry_past_payload_is_rejected() {
        let toc = sample();
        let short = Toc { payload_len: 18, ..toc.clone() };
        let decoded = Toc::decode(
            &short.encode_toc(Endian::Little).unwrap(),
            &toc.encode_filenames(Endian::Little).unwrap(),
            &toc.encode_hash_db(Endian::Little).unwrap(),
            Endian::Little,
        );
        let err = decoded.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Malformed(_)));
    }

    #[test]
    fn test_filename_block_is_padded() {
        let toc = sample();
        let bytes = toc.encode_filenames(Endian::Little).unwrap();
        let header = 4 + 3 * 16;
        // "Cars/a.mesh" is 11 bytes + NUL = 12, already a multiple of 4.
        assert_eq!(bytes.len(), header + 12 + 12 + 16);
        assert_eq!(&bytes[header..header + 11], b"Cars/a.mesh");
        assert_eq!(bytes[header + 11], 0);
    }

    #[test]
    fn test_find_and_lookup() {
        let toc = sample();
        let (entry, instance) = toc.find("Cars\\b.mesh").unwrap();
        assert_eq!(entry.size, 10);
        assert_eq!(toc.filename(instance), Some("Cars/b.mesh"));
        assert!(toc.find("Cars/c.mesh").is_none());
        assert!(toc.lookup(&hash_bytes(b"font")).unwrap().compressed);
        assert!(toc.lookup(&hash_bytes(b"sound")).is_none());
    }

    #[test]
    fn test_hash_db_is_sorted() {
        let digests: Vec<_> = (0u8..20).map(|i| hash_bytes(&[i])).collect();
        let db = HashDb::new(digests.iter().enumerate().map(|(i, d)| (*d, i as u32)));
        assert!(db.iter().is_sorted_by_key(|(digest, _)| *digest));
        for (i, digest) in digests.iter().enumerate() {
            assert_eq!(db.lookup(digest), Some(i as u32));
        }
    }

    #[test]
    fn test_corrupt_tables_are_rejected() {
        let toc = sample();
        let endian = Endian::Little;
        let entries = toc.encode_toc(endian).unwrap();
        let filenames = toc.encode_filenames(endian).unwrap();
        let hash_db = toc.encode_hash_db(endian).unwrap();
        assert!(Toc::decode(&entries[..entries.len() - 1], &filenames, &hash_db, endian).is_err());
        let mut renamed = filenames.clone();
        let last = renamed.len() - 8;
        renamed[last] = b'X';
        assert!(Toc::decode(&entries, &renamed, &hash_db, endian).is_err());
        let empty = HashDb::default().encode(endian).unwrap();
        assert!(Toc::decode(&entries, &filenames, &empty, endian).is_ok());
    }
}
