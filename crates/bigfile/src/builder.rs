use crate::config::BigfileConfig;
use crate::error::{ErrorKind, Result};
use crate::toc::{HashDb, Instance, Toc, TocEntry};
use crate::writer::{ArchiveWriter, PayloadWriter, Simulator};
use databuild_hash::{Digest, file_id};
use databuild_storage::{AtomicFile, logical_name};
use exn::ResultExt;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::instrument;

#[derive(Debug, Clone)]
struct Candidate {
    name: String,
    digest: Digest,
}

/// Packs queued files into a payload plus its tables.
///
/// Files are identified by their digest alone: two paths with equal digests
/// are assumed to hold the same bytes and, unless duplicates are allowed,
/// only the first one is written.
#[derive(Debug)]
pub struct ArchiveBuilder {
    config: BigfileConfig,
    root: PathBuf,
    candidates: Vec<Candidate>,
    names: HashSet<String>,
}
impl ArchiveBuilder {
    /// Queued paths are resolved against `root`.
    pub fn new(config: BigfileConfig, root: impl Into<PathBuf>) -> Self {
        Self { config, root: root.into(), candidates: Vec::new(), names: HashSet::new() }
    }

    pub fn config(&self) -> &BigfileConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Queue a file. A path queued twice keeps its first digest; returns
    /// whether it was new.
    pub fn add(&mut self, path: impl AsRef<Path>, digest: Digest) -> bool {
        let name = logical_name(path);
        if !self.names.insert(name.clone()) {
            return false;
        }
        self.candidates.push(Candidate { name, digest });
        true
    }

    /// Write `<name>` artifacts into `out_dir`. Without `write_payload` only
    /// the tables are written, with offsets the payload would have.
    ///
    /// Every artifact is written to a temporary file first; none replace the
    /// previous ones until all of them were written.
    #[instrument(skip(self, out_dir), fields(out_dir = %out_dir.as_ref().display(), files = self.candidates.len()))]
    pub fn save(&self, out_dir: impl AsRef<Path>, name: &str, write_payload: bool) -> Result<Toc> {
        let out_dir = out_dir.as_ref();
        let (toc, payload) = match write_payload {
            true => {
                let mut writer = PayloadWriter::create(self.config.payload_path(out_dir, name), &self.config)?;
                if !self.config.compress_files {
                    let mut simulator = Simulator::new(&self.config);
                    self.layout(&mut simulator)?;
                    writer.reserve(simulator.position())?;
                }
                let toc = self.layout(&mut writer)?;
                (toc, Some(writer.finish()?))
            },
            false => (self.layout(&mut Simulator::new(&self.config))?, None),
        };

        let endian = self.config.endian;
        let tables = [
            (self.config.filename_db_path(out_dir, name), toc.encode_filenames(endian)?),
            (self.config.hash_db_path(out_dir, name), toc.encode_hash_db(endian)?),
            (self.config.toc_path(out_dir, name), toc.encode_toc(endian)?),
        ];
        let mut pending = Vec::with_capacity(tables.len() + 1);
        pending.extend(payload);
        for (path, data) in tables {
            let mut file = AtomicFile::create(&path).or_raise(|| ErrorKind::Write(path.clone()))?;
            file.write_all(&data).or_raise(|| ErrorKind::Write(path.clone()))?;
            pending.push(file);
        }
        // The table of contents goes last. It records the payload length, so a
        // payload committed without its tables is detected on read.
        for file in pending {
            let target = file.target().to_path_buf();
            file.commit().or_raise(|| ErrorKind::Write(target))?;
        }
        tracing::info!(entries = toc.len(), instances = self.candidates.len(), write_payload, "Saved archive");
        Ok(toc)
    }

    /// Place every unique payload with `writer`, in first-occurrence order.
    fn layout(&self, writer: &mut impl ArchiveWriter) -> Result<Toc> {
        let mut groups: Vec<(Digest, Vec<usize>)> = Vec::new();
        let mut by_digest: HashMap<Digest, usize> = HashMap::new();
        for (index, candidate) in self.candidates.iter().enumerate() {
            let group = *by_digest.entry(candidate.digest).or_insert_with(|| {
                groups.push((candidate.digest, Vec::new()));
                groups.len() - 1
            });
            groups[group].1.push(index);
        }

        let mut entries = Vec::with_capacity(groups.len());
        for (digest, members) in &groups {
            let mut placements = Vec::with_capacity(members.len());
            let mut instances = Vec::with_capacity(members.len());
            for (n, &index) in members.iter().enumerate() {
                let candidate = &self.candidates[index];
                let placement = match (n, self.config.allow_duplicate_files) {
                    (0, _) | (_, true) => writer.write_file(&self.root.join(&candidate.name))?,
                    (_, false) => placements[0],
                };
                placements.push(placement);
                instances.push(Instance {
                    file_id: file_id(&candidate.name),
                    offset: placement.offset,
                    filename_index: u32::try_from(index)
                        .map_err(|_| ErrorKind::malformed("too many files for one archive"))?,
                });
            }
            if members.len() > 1 {
                tracing::debug!(%digest, instances = members.len(), "Deduplicated payload");
            }
            let first = placements[0];
            entries.push(TocEntry { size: first.size, compressed: first.compressed, instances });
        }

        let hash_db = HashDb::new(groups.iter().enumerate().map(|(index, (digest, _))| (*digest, index as u32)));
        let filenames = self.candidates.iter().map(|candidate| candidate.name.clone()).collect();
        Ok(Toc::new(entries, filenames, hash_db, writer.position()))
    }
}
