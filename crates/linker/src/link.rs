//! One incremental link of an archive.

use crate::entry::{FileEntry, FileEntryCache};
use crate::error::{ErrorKind, Result};
use crate::node::NodeGraph;
use databuild_bigfile::ArchiveBuilder;
use databuild_config::Config;
use databuild_depend::{DepFile, DepRecord, DepRule, DependencyStore};
use databuild_hash::HashPool;
use exn::ResultExt;
use std::path::PathBuf;
use tracing::instrument;

/// What a [`Linker::run`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Nothing changed since the last link.
    UpToDate,
    /// The archive was rebuilt with this many unique payloads and paths.
    Linked { entries: usize, instances: usize },
}

pub struct Linker<'a> {
    config: &'a Config,
    pool: HashPool,
}
impl<'a> Linker<'a> {
    /// A linker hashing on `config.threads` threads.
    pub fn new(config: &'a Config) -> Result<Self> {
        let pool = HashPool::with_num_threads(config.threads).or_raise(|| ErrorKind::ThreadPool)?;
        Ok(Self::with_pool(config, pool))
    }

    pub fn with_pool(config: &'a Config, pool: HashPool) -> Self {
        Self { config, pool }
    }

    /// `<dst>/<name><toc extension>.cache`
    pub fn cache_path(&self) -> PathBuf {
        self.config.paths.dst.join(self.cache_name())
    }

    /// `<dep>/<name><toc extension><record extension>`, holding the archive's
    /// own dependency record.
    pub fn record_path(&self) -> PathBuf {
        let config = self.config;
        config.paths.dep.join(format!("{}{}", self.toc_name(), config.dependency.extension))
    }

    fn artifact(&self, extension: &str) -> String {
        format!("{}{extension}", self.config.name)
    }

    fn toc_name(&self) -> String {
        self.artifact(&self.config.bigfile.toc_extension)
    }

    fn cache_name(&self) -> String {
        format!("{}.cache", self.toc_name())
    }

    /// Bring the archive up to date with the node graph.
    ///
    /// The archive is rebuilt when any listed file changed, when a file was
    /// dropped from the graph, or when the archive's own dependency record
    /// says its inputs or outputs changed. Nothing is written otherwise.
    #[instrument(skip(self), fields(name = %self.config.name, build_bigfile = self.config.build_bigfile))]
    pub fn run(&self) -> Result<LinkOutcome> {
        let config = self.config;
        let paths = &config.paths;
        let cache_path = self.cache_path();

        let mut loaded = FileEntryCache::load(&cache_path)?;
        loaded.revalidate(&paths.dst);

        let graph = NodeGraph::load(&paths.dst, self.artifact(&config.bigfile.node_extension))?;
        let mut current = FileEntryCache::new();
        for file in graph.files() {
            let entry = match loaded.remove(file) {
                Some(mut entry) => {
                    entry.mark_used();
                    entry
                },
                None => FileEntry::new(file),
            };
            current.insert(entry);
        }
        // Whatever is left in the loaded cache was dropped from the graph.
        let all_used = loaded.is_empty();
        let all_up_to_date = current.all_up_to_date();
        let hashed = current.rehash(&paths.dst, &self.pool);
        tracing::debug!(files = current.len(), hashed, dropped = loaded.len(), "Reconciled file entries");

        let toc_name = self.toc_name();
        let mut store = self.dependency_store();
        if all_up_to_date && all_used && !store.is_modified(&toc_name) {
            tracing::info!("Up-to-date");
            return Ok(LinkOutcome::UpToDate);
        }

        tracing::info!(files = current.len(), "Linking");
        let mut builder = ArchiveBuilder::new(config.bigfile.clone(), &paths.dst);
        for entry in current.iter() {
            builder.add(entry.path(), entry.content_hash());
        }
        let toc = builder.save(&paths.publish, &config.name, config.build_bigfile).or_raise(|| ErrorKind::Archive)?;

        if !all_up_to_date || !all_used || !cache_path.is_file() {
            current.save(&cache_path)?;
        }
        // What's on disk now is the baseline for the next run.
        store.register(self.archive_record()).init();
        store.save_cache(self.record_path()).or_raise(|| ErrorKind::Dependency)?;

        Ok(LinkOutcome::Linked { entries: toc.len(), instances: toc.filenames().len() })
    }

    /// The archive's record as last saved, ready to be asked whether the
    /// archive is stale.
    ///
    /// A record that can't be read, or one made for another publish folder,
    /// is dropped so the archive counts as modified.
    fn dependency_store(&self) -> DependencyStore {
        let config = self.config;
        let paths = &config.paths;
        let mut store = DependencyStore::new(&paths.publish, &paths.dst, &paths.dep, config.dependency.clone());
        let record_path = self.record_path();
        if let Err(e) = store.load_cache(&record_path) {
            tracing::warn!(path = %record_path.display(), error = ?e, "Ignoring unreadable archive dependency record");
        }

        let toc_name = self.toc_name();
        let expected = paths.publish.join(&toc_name);
        if store.get(&toc_name).is_some_and(|file| file.main().full() != expected) {
            tracing::debug!(publish = %paths.publish.display(), "Archive record is for another publish folder");
            store.remove(&toc_name);
        }
        // A payload that was skipped last time is wanted now.
        if config.build_bigfile
            && let Some(file) = store.get_mut(&toc_name)
        {
            file.push_out(self.output(&config.bigfile.payload_extension));
        }
        store
    }

    /// The table of contents as main file, the entry cache as input and the
    /// other artifacts as outputs.
    fn archive_record(&self) -> DepFile {
        let config = self.config;
        let paths = &config.paths;
        let bigfile = &config.bigfile;
        let method = config.dependency.method;
        let mut file = DepFile::from_main(DepRecord::new(self.toc_name(), &paths.publish).with_method(method));
        file.add_in_with_method(self.cache_name(), &paths.dst, method);
        file.push_out(self.output(&bigfile.filename_db_extension));
        file.push_out(self.output(&bigfile.hash_db_extension));
        if config.build_bigfile {
            file.push_out(self.output(&bigfile.payload_extension));
        }
        file
    }

    fn output(&self, extension: &str) -> DepRecord {
        DepRecord::new(self.artifact(extension), &self.config.paths.publish)
            .with_method(self.config.dependency.method)
            .with_rule(DepRule::MustExist)
    }
}
