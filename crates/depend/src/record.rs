//! A single tracked file.

use crate::state::State;
use databuild_hash::{Digest, HashMethod, Hashed};
use databuild_storage::logical_name;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// When a tracked file counts as changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepRule {
    /// Changed when its digest differs from the last one seen. A file that was
    /// never there and still isn't is fine.
    #[default]
    OnChange,
    /// Changed whenever it's absent, on top of the above. Used for outputs: a
    /// deleted output has to be rebuilt.
    MustExist,
}

/// Result of the last [`DepRecord::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DepStatus {
    /// Never updated; the status means nothing yet.
    #[default]
    Uninitialized,
    /// Previously present, now gone.
    NotFound,
    Changed,
    Unchanged,
}

/// A tracked file: where it lives, how it's hashed and what it looked like
/// last time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepRecord {
    filename: String,
    folder: PathBuf,
    full: PathBuf,
    hash: Digest,
    method: HashMethod,
    rule: DepRule,
    status: DepStatus,
}
impl DepRecord {
    /// Track `filename` (relative, any separator style) under `folder`.
    pub fn new(filename: impl AsRef<Path>, folder: impl Into<PathBuf>) -> Self {
        let filename = logical_name(filename);
        let folder = folder.into();
        let full = folder.join(&filename);
        Self {
            filename,
            folder,
            full,
            hash: Digest::EMPTY,
            method: HashMethod::default(),
            rule: DepRule::default(),
            status: DepStatus::Uninitialized,
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: HashMethod) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_rule(mut self, rule: DepRule) -> Self {
        self.rule = rule;
        self
    }

    #[must_use]
    pub fn with_hash(mut self, hash: Digest) -> Self {
        self.hash = hash;
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// `folder` joined with `filename`; records are unique by this.
    pub fn full(&self) -> &Path {
        &self.full
    }

    pub fn hash(&self) -> Digest {
        self.hash
    }

    pub fn method(&self) -> HashMethod {
        self.method
    }

    pub fn rule(&self) -> DepRule {
        self.rule
    }

    pub fn status(&self) -> DepStatus {
        self.status
    }

    /// Hash the file as it is on disk right now. Touches nothing but the file,
    /// so it's safe to run on a worker thread.
    pub fn probe(&self) -> Hashed {
        self.method.digest(&self.full)
    }

    /// Move to the next status given a fresh [`probe`](Self::probe).
    pub fn apply(&mut self, probe: Hashed) -> DepStatus {
        let new = probe.digest();
        self.status = match self.rule {
            DepRule::MustExist if new.is_empty() || new != self.hash => {
                self.hash = new;
                DepStatus::Changed
            },
            DepRule::MustExist => DepStatus::Unchanged,
            DepRule::OnChange if new == self.hash => DepStatus::Unchanged,
            // It was there last time (otherwise the hashes would match).
            DepRule::OnChange if new.is_empty() => {
                self.hash = Digest::EMPTY;
                DepStatus::NotFound
            },
            DepRule::OnChange => {
                self.hash = new;
                DepStatus::Changed
            },
        };
        self.status
    }

    pub fn update(&mut self) -> DepStatus {
        let probe = self.probe();
        self.apply(probe)
    }

    /// Forget history and take the file as it is now as the baseline.
    pub fn init(&mut self) {
        let probe = self.probe();
        self.init_with(probe);
    }

    pub(crate) fn init_with(&mut self, probe: Hashed) {
        self.hash = Digest::EMPTY;
        self.status = DepStatus::Uninitialized;
        // The first sighting of a file is the baseline, not a change.
        if self.apply(probe) == DepStatus::Changed {
            self.status = DepStatus::Unchanged;
        }
    }

    pub fn state(&self) -> State {
        match self.status {
            DepStatus::Unchanged => State::Ok,
            DepStatus::NotFound => State::Missing,
            DepStatus::Changed if self.hash.is_empty() => State::Missing,
            DepStatus::Changed | DepStatus::Uninitialized => State::Modified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use databuild_hash::hash_bytes;
    use rstest::rstest;

    fn content(data: &[u8]) -> Hashed {
        Hashed::Digest(hash_bytes(data))
    }

    #[test]
    fn test_full_path() {
        let record = DepRecord::new("Cars\\BMW\\body.mesh", "/data/Src");
        assert_eq!(record.filename(), "Cars/BMW/body.mesh");
        assert_eq!(record.full(), Path::new("/data/Src/Cars/BMW/body.mesh"));
        assert_eq!(record.status(), DepStatus::Uninitialized);
        assert_eq!(record.state(), State::Modified);
    }

    #[rstest]
    // Same digest as last time.
    #[case(DepRule::OnChange, b"v1".as_slice(), Some(b"v1".as_slice()), DepStatus::Unchanged, State::Ok)]
    #[case(DepRule::MustExist, b"v1".as_slice(), Some(b"v1".as_slice()), DepStatus::Unchanged, State::Ok)]
    // Different digest.
    #[case(DepRule::OnChange, b"v1".as_slice(), Some(b"v2".as_slice()), DepStatus::Changed, State::Modified)]
    #[case(DepRule::MustExist, b"v1".as_slice(), Some(b"v2".as_slice()), DepStatus::Changed, State::Modified)]
    // Deleted since last time.
    #[case(DepRule::OnChange, b"v1".as_slice(), None, DepStatus::NotFound, State::Missing)]
    #[case(DepRule::MustExist, b"v1".as_slice(), None, DepStatus::Changed, State::Missing)]
    fn test_transitions(
        #[case] rule: DepRule,
        #[case] before: &[u8],
        #[case] after: Option<&[u8]>,
        #[case] status: DepStatus,
        #[case] state: State,
    ) {
        let mut record = DepRecord::new("a.txt", "/src").with_rule(rule).with_hash(hash_bytes(before));
        let probe = after.map(content).unwrap_or(Hashed::NotFound);
        assert_eq!(record.apply(probe), status);
        assert_eq!(record.state(), state);
        assert_eq!(record.hash(), after.map(hash_bytes).unwrap_or(Digest::EMPTY));
    }

    #[test]
    fn test_absent_and_never_seen() {
        let mut on_change = DepRecord::new("a.txt", "/src");
        assert_eq!(on_change.apply(Hashed::NotFound), DepStatus::Unchanged);
        let mut must_exist = DepRecord::new("a.txt", "/src").with_rule(DepRule::MustExist);
        assert_eq!(must_exist.apply(Hashed::NotFound), DepStatus::Changed);
        assert_eq!(must_exist.state(), State::Missing);
    }

    #[test]
    fn test_unreadable_is_changed() {
        let mut record = DepRecord::new("a.txt", "/src").with_hash(hash_bytes(b"v1"));
        let err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_ne!(record.apply(Hashed::Io(err)), DepStatus::Unchanged);
        assert!(record.state().is_modified());
    }

    #[test]
    fn test_init_takes_baseline() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), b"v1").unwrap();
        let mut record = DepRecord::new("a.txt", temp_dir.path()).with_method(HashMethod::ContentHash);
        record.init();
        assert_eq!(record.status(), DepStatus::Unchanged);
        assert_eq!(record.hash(), hash_bytes(b"v1"));
        assert_eq!(record.update(), DepStatus::Unchanged);
        std::fs::write(temp_dir.path().join("a.txt"), b"v2").unwrap();
        assert_eq!(record.update(), DepStatus::Changed);
        assert_eq!(record.update(), DepStatus::Unchanged);
    }

    #[test]
    fn test_must_exist_output_deleted() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output = temp_dir.path().join("body.bin");
        std::fs::write(&output, b"built").unwrap();
        let mut record = DepRecord::new("body.bin", temp_dir.path()).with_rule(DepRule::MustExist);
        record.init();
        assert_eq!(record.state(), State::Ok);
        std::fs::remove_file(&output).unwrap();
        assert_eq!(record.update(), DepStatus::Changed);
        assert!(record.hash().is_empty());
        assert_eq!(record.state(), State::Missing);
    }
}
