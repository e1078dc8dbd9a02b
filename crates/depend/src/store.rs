//! All dependency records of one build scope.

use crate::config::DependencyConfig;
use crate::error::{ErrorKind, Result};
use crate::file::DepFile;
use crate::format;
use crate::record::{DepRecord, DepRule};
use databuild_hash::HashPool;
use databuild_storage::{Walker, logical_name};
use exn::ResultExt;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Owns the [`DepFile`]s of a scope, keyed by their main file's logical name.
///
/// A scope is three roots: sources (main files and extra inputs), destination
/// (outputs) and the folder the per-file records are persisted in.
#[derive(Debug)]
pub struct DependencyStore {
    src: PathBuf,
    dst: PathBuf,
    dep: PathBuf,
    config: DependencyConfig,
    files: BTreeMap<String, DepFile>,
    /// Registered this run, so written out by [`save`](Self::save).
    touched: BTreeSet<String>,
    anything_modified: bool,
}
impl DependencyStore {
    pub fn new(
        src: impl Into<PathBuf>,
        dst: impl Into<PathBuf>,
        dep: impl Into<PathBuf>,
        config: DependencyConfig,
    ) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            dep: dep.into(),
            config,
            files: BTreeMap::new(),
            touched: BTreeSet::new(),
            anything_modified: false,
        }
    }

    pub fn src(&self) -> &Path {
        &self.src
    }

    pub fn dst(&self) -> &Path {
        &self.dst
    }

    pub fn dep(&self) -> &Path {
        &self.dep
    }

    pub fn config(&self) -> &DependencyConfig {
        &self.config
    }

    /// Whether any record was added or replaced this run.
    pub fn anything_modified(&self) -> bool {
        self.anything_modified
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DepFile> {
        self.files.values()
    }

    /// Record that `main` (under the source root) produces `outputs` (under
    /// the destination root), replacing whatever was known about it.
    pub fn set(&mut self, main: impl AsRef<Path>, outputs: &[impl AsRef<Path>]) -> &mut DepFile {
        self.set_with_inputs(main, &[] as &[&str], outputs)
    }

    /// Like [`set`](Self::set), with extra inputs under the source root.
    pub fn set_with_inputs(
        &mut self,
        main: impl AsRef<Path>,
        inputs: &[impl AsRef<Path>],
        outputs: &[impl AsRef<Path>],
    ) -> &mut DepFile {
        let method = self.config.method;
        let mut file = DepFile::from_main(DepRecord::new(main, &self.src).with_method(method));
        for input in inputs {
            file.add_in_with_method(input, &self.src, method);
        }
        for output in outputs {
            file.add_out_with_rule(output, &self.dst, DepRule::MustExist);
        }
        self.register(file)
    }

    /// Add or replace a record without scheduling it to be saved.
    pub fn add(&mut self, file: DepFile) -> Option<DepFile> {
        self.anything_modified = true;
        self.files.insert(file.main().filename().to_string(), file)
    }

    /// Add or replace a record and schedule it to be saved.
    pub fn register(&mut self, file: DepFile) -> &mut DepFile {
        let key = file.main().filename().to_string();
        self.anything_modified = true;
        self.touched.insert(key.clone());
        match self.files.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.insert(file);
                entry.into_mut()
            },
            Entry::Vacant(entry) => entry.insert(file),
        }
    }

    pub fn get(&self, main: impl AsRef<Path>) -> Option<&DepFile> {
        self.files.get(&logical_name(main))
    }

    pub fn get_mut(&mut self, main: impl AsRef<Path>) -> Option<&mut DepFile> {
        self.files.get_mut(&logical_name(main))
    }

    pub fn remove(&mut self, main: impl AsRef<Path>) -> Option<DepFile> {
        let key = logical_name(main);
        self.touched.remove(&key);
        self.files.remove(&key)
    }

    /// Whether `main` needs to be rebuilt. With no record, it does.
    pub fn is_modified(&mut self, main: impl AsRef<Path>) -> bool {
        self.is_modified_with_key(main, "")
    }

    /// Whether `main` needs to be rebuilt, also treating a different build
    /// configuration fingerprint as a modification. An empty key matches
    /// anything.
    pub fn is_modified_with_key(&mut self, main: impl AsRef<Path>, user_key: &str) -> bool {
        let Some(file) = self.files.get_mut(&logical_name(main)) else {
            return true;
        };
        if !user_key.is_empty() && file.user_key() != user_key {
            tracing::debug!(main = file.main().filename(), "Build configuration changed");
            return true;
        }
        file.is_modified()
    }

    /// Replace everything in the store with the records found under the
    /// dependency root. Files that can't be read are skipped.
    #[instrument(skip(self), fields(dep = %self.dep.display()))]
    pub fn load(&mut self) -> Result<usize> {
        self.files.clear();
        self.touched.clear();
        let filter = self.config.walk_filter()?;
        for found in Walker::new(&self.dep, filter) {
            let found = match found {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(error = ?e, "Skipping unreadable entry in dependency folder");
                    continue;
                },
            };
            let path = self.dep.join(&found.path);
            match read_records(&path) {
                Ok(files) => files.into_iter().for_each(|file| self.insert_loaded(file)),
                Err(e) => tracing::warn!(path = %path.display(), error = ?e, "Skipping dependency record"),
            }
        }
        tracing::debug!(records = self.files.len(), "Loaded dependency records");
        Ok(self.files.len())
    }

    /// Add the records of a single consolidated cache file. A missing cache
    /// is an empty one.
    pub fn load_cache(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No dependency cache");
            return Ok(0);
        }
        let files = read_records(path)?;
        let count = files.len();
        files.into_iter().for_each(|file| self.insert_loaded(file));
        Ok(count)
    }

    /// Write every record into a single consolidated cache file.
    pub fn save_cache(&self, path: impl AsRef<Path>) -> Result<()> {
        let files: Vec<DepFile> = self.files.values().cloned().collect();
        let bytes = format::encode(&files, self.config.format);
        databuild_storage::write_atomic(path, &bytes).or_raise(|| ErrorKind::Storage)
    }

    /// Persist every record registered this run under the dependency root.
    #[instrument(skip(self), fields(dep = %self.dep.display()))]
    pub fn save(&mut self) -> Result<usize> {
        let mut saved = 0;
        let keys: Vec<String> = self.touched.iter().cloned().collect();
        for key in keys {
            if let Some(file) = self.files.get_mut(&key) {
                file.save(&self.dep, &self.config)?;
                saved += 1;
            }
            // Only once written, so a failed save is retried next time.
            self.touched.remove(&key);
        }
        Ok(saved)
    }

    /// Compare every loaded record against disk.
    ///
    /// Files are hashed on `pool`; results are applied here, in key order.
    #[instrument(skip_all, fields(records = self.files.len()))]
    pub fn update(&mut self, pool: &HashPool) {
        let jobs: Vec<_> = self
            .files
            .values()
            .filter(|file| file.is_loaded())
            .flat_map(|file| file.jobs().map(|(path, method)| (path.to_path_buf(), method)))
            .collect();
        let mut probes = pool.map(&jobs, |(path, method)| method.digest(path)).into_iter();
        for file in self.files.values_mut().filter(|file| file.is_loaded()) {
            file.apply_update(&mut probes);
        }
        tracing::debug!(files = jobs.len(), "Updated dependency records");
    }

    fn insert_loaded(&mut self, mut file: DepFile) {
        file.mark_loaded();
        self.files.insert(file.main().filename().to_string(), file);
    }
}

fn read_records(path: &Path) -> Result<Vec<DepFile>> {
    let bytes = std::fs::read(path).map_err(ErrorKind::Io)?;
    format::decode(&bytes)
}
