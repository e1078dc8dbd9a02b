//! Dependency set of one build unit.

use crate::config::DependencyConfig;
use crate::error::{ErrorKind, Result};
use crate::format;
use crate::record::{DepRecord, DepRule, DepStatus};
use crate::state::State;
use databuild_hash::{HashMethod, Hashed};
use exn::ResultExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Where a [`DepFile`] came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed this run; there's no history to compare against.
    #[default]
    Created,
    /// Read back from a persisted record.
    Loaded,
}

/// The main file of a build unit plus the extra inputs it's built from and
/// the outputs it produces.
#[derive(Debug, Clone)]
pub struct DepFile {
    main: DepRecord,
    inputs: Vec<DepRecord>,
    outputs: Vec<DepRecord>,
    input_keys: HashSet<PathBuf>,
    output_keys: HashSet<PathBuf>,
    user_key: String,
    lifecycle: Lifecycle,
    updated: bool,
}
impl DepFile {
    pub fn new(filename: impl AsRef<Path>, folder: impl Into<PathBuf>) -> Self {
        Self::from_main(DepRecord::new(filename, folder))
    }

    pub fn from_main(main: DepRecord) -> Self {
        Self {
            main,
            inputs: Vec::new(),
            outputs: Vec::new(),
            input_keys: HashSet::new(),
            output_keys: HashSet::new(),
            user_key: String::new(),
            lifecycle: Lifecycle::Created,
            updated: false,
        }
    }

    /// Attach a build configuration fingerprint; see
    /// [`DependencyStore::is_modified_with_key`](crate::DependencyStore::is_modified_with_key).
    #[must_use]
    pub fn with_user_key(mut self, user_key: impl Into<String>) -> Self {
        self.user_key = user_key.into();
        self
    }

    pub fn main(&self) -> &DepRecord {
        &self.main
    }

    pub fn inputs(&self) -> &[DepRecord] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[DepRecord] {
        &self.outputs
    }

    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    pub fn set_user_key(&mut self, user_key: impl Into<String>) {
        self.user_key = user_key.into();
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_loaded(&self) -> bool {
        self.lifecycle == Lifecycle::Loaded
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.lifecycle = Lifecycle::Loaded;
        self.updated = false;
    }

    /// Whether the records were brought up to date during this run.
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Main, then inputs, then outputs.
    pub fn records(&self) -> impl Iterator<Item = &DepRecord> {
        std::iter::once(&self.main).chain(&self.inputs).chain(&self.outputs)
    }

    fn records_mut(&mut self) -> impl Iterator<Item = &mut DepRecord> {
        std::iter::once(&mut self.main).chain(&mut self.inputs).chain(&mut self.outputs)
    }

    /// Track an extra input. Adding the same full path twice keeps the first.
    pub fn add_in(&mut self, filename: impl AsRef<Path>, folder: impl Into<PathBuf>) -> bool {
        self.push_in(DepRecord::new(filename, folder))
    }

    pub fn add_in_with_rule(&mut self, filename: impl AsRef<Path>, folder: impl Into<PathBuf>, rule: DepRule) -> bool {
        self.push_in(DepRecord::new(filename, folder).with_rule(rule))
    }

    pub fn add_in_with_method(
        &mut self,
        filename: impl AsRef<Path>,
        folder: impl Into<PathBuf>,
        method: HashMethod,
    ) -> bool {
        self.push_in(DepRecord::new(filename, folder).with_method(method))
    }

    /// Track an output. Adding the same full path twice keeps the first.
    pub fn add_out(&mut self, filename: impl AsRef<Path>, folder: impl Into<PathBuf>) -> bool {
        self.push_out(DepRecord::new(filename, folder))
    }

    pub fn add_out_with_rule(&mut self, filename: impl AsRef<Path>, folder: impl Into<PathBuf>, rule: DepRule) -> bool {
        self.push_out(DepRecord::new(filename, folder).with_rule(rule))
    }

    pub fn add_out_with_method(
        &mut self,
        filename: impl AsRef<Path>,
        folder: impl Into<PathBuf>,
        method: HashMethod,
    ) -> bool {
        self.push_out(DepRecord::new(filename, folder).with_method(method))
    }

    pub fn push_in(&mut self, record: DepRecord) -> bool {
        if !self.input_keys.insert(record.full().to_path_buf()) {
            return false;
        }
        self.inputs.push(record);
        true
    }

    pub fn push_out(&mut self, record: DepRecord) -> bool {
        if !self.output_keys.insert(record.full().to_path_buf()) {
            return false;
        }
        self.outputs.push(record);
        true
    }

    pub fn clear_in(&mut self) {
        self.inputs.clear();
        self.input_keys.clear();
    }

    pub fn clear_out(&mut self) {
        self.outputs.clear();
        self.output_keys.clear();
    }

    pub fn has_in(&self, full: impl AsRef<Path>) -> bool {
        self.input_keys.contains(full.as_ref())
    }

    pub fn has_out(&self, full: impl AsRef<Path>) -> bool {
        self.output_keys.contains(full.as_ref())
    }

    /// Take every tracked file as it is now as the baseline.
    pub fn init(&mut self) {
        self.records_mut().for_each(DepRecord::init);
        self.updated = true;
    }

    /// Compare every tracked file against its last digest.
    pub fn update(&mut self) {
        self.records_mut().for_each(|record| {
            record.update();
        });
        self.updated = true;
    }

    /// The files that [`update`](Self::update) would hash, in record order.
    pub fn jobs(&self) -> impl Iterator<Item = (&Path, HashMethod)> {
        self.records().map(|record| (record.full(), record.method()))
    }

    /// Finish an update whose hashing happened elsewhere: takes one probe per
    /// record, in [`jobs`](Self::jobs) order.
    pub fn apply_update(&mut self, probes: &mut impl Iterator<Item = Hashed>) {
        for record in self.records_mut() {
            let probe = probes.next().unwrap_or(Hashed::NotFound);
            record.apply(probe);
        }
        self.updated = true;
    }

    /// A file without history is always modified. Otherwise the records are
    /// updated (once per run) and any non-unchanged record means modified.
    pub fn is_modified(&mut self) -> bool {
        if self.lifecycle == Lifecycle::Created {
            return true;
        }
        if !self.updated {
            self.update();
        }
        self.records().any(|record| record.status() != DepStatus::Unchanged)
    }

    pub fn state(&self) -> State {
        match self.lifecycle {
            Lifecycle::Created => State::Modified,
            Lifecycle::Loaded => State::merge_all(self.records().map(DepRecord::state)),
        }
    }

    /// Same main file and the same set of inputs, regardless of order.
    pub fn same_dependencies(&self, other: &Self) -> bool {
        self.main.full() == other.main.full() && self.input_keys == other.input_keys
    }

    /// Where this file's record lives under `dir`.
    pub fn record_path(&self, dir: impl AsRef<Path>, config: &DependencyConfig) -> PathBuf {
        dir.as_ref().join(format!("{}{}", self.main.filename(), config.extension))
    }

    /// Persist under `dir`, bringing the records up to date first if nothing
    /// has this run.
    #[instrument(level = "debug", skip_all, fields(main = %self.main.filename()))]
    pub fn save(&mut self, dir: impl AsRef<Path>, config: &DependencyConfig) -> Result<()> {
        if !self.updated {
            match self.lifecycle {
                Lifecycle::Created => self.init(),
                Lifecycle::Loaded => self.update(),
            }
        }
        let path = self.record_path(dir, config);
        let bytes = format::encode(std::slice::from_ref(self), config.format);
        databuild_storage::write_atomic(&path, &bytes).or_raise(|| ErrorKind::Storage)?;
        tracing::trace!(path = %path.display(), "Saved dependency record");
        Ok(())
    }

    /// Replace inputs, outputs and the main record's history with what's
    /// persisted under `dir`.
    ///
    /// On any failure the file is left without inputs or outputs and marked
    /// [`Lifecycle::Created`], so whoever asked treats it as needing a full
    /// rebuild.
    pub fn load(&mut self, dir: impl AsRef<Path>, config: &DependencyConfig) -> Result<()> {
        self.clear_in();
        self.clear_out();
        self.lifecycle = Lifecycle::Created;
        self.updated = false;
        let path = self.record_path(dir, config);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => exn::bail!(ErrorKind::NotFound(path)),
            Err(e) => exn::bail!(ErrorKind::Io(e)),
        };
        let loaded = format::decode_single(&bytes)?;
        if loaded.main.full() != self.main.full() {
            tracing::debug!(
                expected = %self.main.full().display(),
                found = %loaded.main.full().display(),
                "Dependency record tracks a different main file"
            );
            exn::bail!(ErrorKind::OtherMain(path));
        }
        self.main = loaded.main;
        self.user_key = loaded.user_key;
        self.inputs = loaded.inputs;
        self.input_keys = loaded.input_keys;
        self.outputs = loaded.outputs;
        self.output_keys = loaded.output_keys;
        self.mark_loaded();
        Ok(())
    }

    /// Remove the persisted record, if there is one.
    pub fn delete(&self, dir: impl AsRef<Path>, config: &DependencyConfig) -> Result<()> {
        match std::fs::remove_file(self.record_path(dir, config)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ErrorKind::Io(e).into()),
        }
    }
}
