//! What each linked file looked like the last time it was hashed.
//!
//! The cache is a text file with one entry per line:
//!
//! ```text
//! Cars/BMW/body.mesh=0000000000000400=08DC1E3B7A2F1C00=0102030405060708090A0B0C0D0E0F10
//! ```
//!
//! holding the path, its size, last write ticks and content digest. Fields are
//! split off from the right, so a path may itself contain `=`.

use crate::error::{ErrorKind, Result};
use databuild_hash::{Digest, HashPool, Hashed, hash_file};
use databuild_storage::{FileInfo, logical_name, stat, write_atomic};
use exn::ResultExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    path: String,
    size: u64,
    last_write_ticks: i64,
    content_hash: Digest,
    used: bool,
    up_to_date: bool,
}
impl FileEntry {
    /// An entry seen for the first time: nothing known yet.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_stat(path, 0, 0, Digest::EMPTY)
    }

    pub fn with_stat(path: impl AsRef<Path>, size: u64, last_write_ticks: i64, content_hash: Digest) -> Self {
        Self { path: logical_name(path), size, last_write_ticks, content_hash, used: false, up_to_date: false }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn last_write_ticks(&self) -> i64 {
        self.last_write_ticks
    }

    pub fn content_hash(&self) -> Digest {
        self.content_hash
    }

    /// Whether a node file still refers to this entry.
    pub fn is_used(&self) -> bool {
        self.used
    }

    pub fn is_up_to_date(&self) -> bool {
        self.up_to_date
    }

    pub(crate) fn mark_used(&mut self) {
        self.used = true;
    }

    /// Compare against the file under `root` by its last write time only. A
    /// changed file gets its new size and time but keeps its old digest until
    /// it's re-hashed.
    pub fn revalidate(&mut self, root: &Path) {
        match stat(root.join(&self.path)) {
            Ok(Some(info)) => {
                self.up_to_date = info.ticks() == self.last_write_ticks;
                if !self.up_to_date {
                    self.refresh(&info);
                }
            },
            Ok(None) | Err(_) => self.clear(),
        }
    }

    fn refresh(&mut self, info: &FileInfo) {
        self.size = info.size;
        self.last_write_ticks = info.ticks();
    }

    fn clear(&mut self) {
        self.size = 0;
        self.last_write_ticks = 0;
        self.content_hash = Digest::EMPTY;
        self.up_to_date = false;
    }

    fn apply(&mut self, (info, hashed): (Option<FileInfo>, Hashed)) {
        match (info, hashed) {
            (Some(info), Hashed::Digest(digest)) => {
                self.refresh(&info);
                self.content_hash = digest;
            },
            (_, hashed) => {
                tracing::warn!(path = %self.path, hashed = ?hashed, "Linked file can't be hashed");
                self.clear();
            },
        }
    }

    fn to_line(&self) -> String {
        format!("{}={:016X}={:016X}={}", self.path, self.size, self.last_write_ticks, self.content_hash)
    }

    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.rsplitn(4, '=');
        let hash = fields.next()?.parse().ok()?;
        let ticks = u64::from_str_radix(fields.next()?, 16).ok()?;
        let size = u64::from_str_radix(fields.next()?, 16).ok()?;
        let path = fields.next().filter(|path| !path.is_empty())?;
        // Ticks are written as their two's complement bit pattern.
        Some(Self::with_stat(path, size, ticks as i64, hash))
    }
}

/// File entries in first-insertion order, addressable by path.
#[derive(Debug, Clone, Default)]
pub struct FileEntryCache {
    entries: Vec<FileEntry>,
    index: HashMap<String, usize>,
}
impl FileEntryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a cache file. A missing file is an empty cache; lines that don't
    /// parse are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match std::fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Read(path.to_path_buf())),
        };
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut cache = Self::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            match FileEntry::parse(line) {
                Some(entry) => {
                    cache.insert(entry);
                },
                None => tracing::warn!(line = number + 1, "Skipping malformed file entry"),
            }
        }
        cache
    }

    pub fn to_text(&self) -> String {
        self.entries.iter().map(|entry| entry.to_line() + "\n").collect()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_atomic(path, self.to_text().as_bytes()).or_raise(|| ErrorKind::Cache)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&FileEntry> {
        self.index.get(&logical_name(path)).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.index.contains_key(&logical_name(path))
    }

    /// Add an entry unless its path is already present; returns whether it was.
    pub fn insert(&mut self, entry: FileEntry) -> bool {
        if self.index.contains_key(&entry.path) {
            return false;
        }
        self.index.insert(entry.path.clone(), self.entries.len());
        self.entries.push(entry);
        true
    }

    /// Take an entry out. Doesn't preserve the order of the remaining ones.
    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<FileEntry> {
        let i = self.index.remove(&logical_name(path))?;
        let entry = self.entries.swap_remove(i);
        if let Some(moved) = self.entries.get(i) {
            self.index.insert(moved.path.clone(), i);
        }
        Some(entry)
    }

    pub fn revalidate(&mut self, root: &Path) {
        self.entries.iter_mut().for_each(|entry| entry.revalidate(root));
    }

    pub fn all_up_to_date(&self) -> bool {
        self.entries.iter().all(FileEntry::is_up_to_date)
    }

    pub fn all_used(&self) -> bool {
        self.entries.iter().all(FileEntry::is_used)
    }

    /// Stat and hash every entry that isn't up to date on `pool`, then apply
    /// the results in entry order. Returns how many were hashed.
    pub fn rehash(&mut self, root: &Path, pool: &HashPool) -> usize {
        let stale: Vec<(usize, PathBuf)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.up_to_date)
            .map(|(i, entry)| (i, root.join(&entry.path)))
            .collect();
        let probes = pool.map(&stale, |(_, path)| {
            let info = stat(path).ok().flatten();
            (info, hash_file(path))
        });
        for ((i, _), probe) in stale.iter().zip(probes) {
            self.entries[*i].apply(probe);
        }
        stale.len()
    }
}
