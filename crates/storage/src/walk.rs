//! Recursive, filtered directory walk.
//!
//! Used to discover persisted dependency records under the dependency root.
//! Folders and files can be rejected by regular expressions matched against
//! their *name* (not the whole path), and files can be limited to a single
//! extension.

use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::validate as validate_path;
use regex::Regex;
use std::fs::{self, DirEntry};
use std::io;
use std::path::{Path, PathBuf};

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Which entries a [`Walker`] yields.
#[derive(Debug, Clone, Default)]
pub struct WalkFilter {
    /// Only yield files whose name ends with this (e.g. `.dep`).
    pub extension: Option<String>,
    /// Folders whose name matches any of these are not descended into.
    pub folder_excludes: Vec<Regex>,
    /// Files whose name matches any of these are not yielded.
    pub file_excludes: Vec<Regex>,
}
impl WalkFilter {
    /// Build a filter from string patterns (as found in configuration).
    pub fn new(
        extension: Option<&str>,
        folder_excludes: &[impl AsRef<str>],
        file_excludes: &[impl AsRef<str>],
    ) -> Result<Self> {
        Ok(Self {
            extension: extension.filter(|e| !e.is_empty()).map(str::to_string),
            folder_excludes: compile(folder_excludes)?,
            file_excludes: compile(file_excludes)?,
        })
    }

    fn rejects_folder(&self, name: &str) -> bool {
        self.folder_excludes.iter().any(|re| re.is_match(name))
    }

    fn accepts_file(&self, name: &str) -> bool {
        if let Some(ext) = &self.extension
            && !name.ends_with(ext.as_str())
        {
            return false;
        }
        !self.file_excludes.iter().any(|re| re.is_match(name))
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            let p = p.as_ref();
            Regex::new(p).map_err(|e| exn::Exn::from(ErrorKind::Pattern(format!("{p}: {e}"))))
        })
        .collect()
}

/// Depth-first walk over a directory tree, yielding files relative to the
/// walk root.
///
/// The order is stable: a folder's files come in name order, then each of its
/// subfolders in name order.
///
/// Errors on individual entries are yielded and the walk carries on with the
/// next entry; a root that doesn't exist yields nothing.
///
/// ```no_run
/// use databuild_storage::{WalkFilter, Walker};
///
/// # fn example() -> databuild_storage::error::Result<()> {
/// let filter = WalkFilter::new(Some(".dep"), &[r"^\.git$"], &[] as &[&str])?;
/// for file in Walker::new("/data/Dep.PC", filter) {
///     println!("{}", file?.path.display());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Walker {
    root: PathBuf,
    filter: WalkFilter,
    stack: Vec<PathBuf>,
    current: Option<(PathBuf, std::vec::IntoIter<io::Result<DirEntry>>)>,
    /// Subfolders of the current folder, visited once it's done.
    subfolders: Vec<PathBuf>,
}
impl Walker {
    pub fn new(root: impl Into<PathBuf>, filter: WalkFilter) -> Self {
        let root = root.into();
        Self { stack: vec![root.clone()], root, filter, current: None, subfolders: Vec::new() }
    }

    fn relative_path(&self, absolute: &Path) -> Result<PathBuf> {
        let relative = absolute
            .strip_prefix(&self.root)
            .map_err(|_| exn::Exn::from(ErrorKind::InvalidPath(absolute.to_path_buf())))?;
        validate_path(relative)
    }

    fn process_entry(&self, entry: DirEntry) -> Result<WalkEntry> {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type().map_err(|e| ErrorKind::from_io(e, &path))?;
        if file_type.is_dir() {
            return Ok(match self.filter.rejects_folder(&name) {
                true => WalkEntry::Skip,
                false => WalkEntry::Descend(path),
            });
        }
        // Follow symlinks for files; a broken link falls through to Skip.
        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Ok(WalkEntry::Skip),
        };
        if !self.filter.accepts_file(&name) {
            return Ok(WalkEntry::Skip);
        }
        Ok(WalkEntry::File(FileInfo::from_metadata(self.relative_path(&path)?, &metadata)?))
    }
}
impl Iterator for Walker {
    type Item = Result<FileInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let dir = self.stack.pop()?;
                match fs::read_dir(&dir) {
                    Ok(entries) => {
                        let mut entries: Vec<_> = entries.collect();
                        entries.sort_by_key(|entry| entry.as_ref().ok().map(DirEntry::file_name));
                        self.current = Some((dir, entries.into_iter()));
                    },
                    // A missing directory is an empty directory.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                    Err(e) => return Some(Err(ErrorKind::from_io(e, &dir).into())),
                }
                continue;
            }
            let (dir, entries) = self.current.as_mut()?;
            let entry = match entries.next() {
                Some(Ok(entry)) => entry,
                Some(Err(e)) => return Some(Err(ErrorKind::from_io(e, dir).into())),
                None => {
                    self.current = None;
                    self.stack.extend(self.subfolders.drain(..).rev());
                    continue;
                },
            };
            match self.process_entry(entry) {
                Ok(WalkEntry::File(f)) => return Some(Ok(f)),
                Ok(WalkEntry::Descend(d)) => self.subfolders.push(d),
                Ok(WalkEntry::Skip) => {},
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"data").unwrap();
    }

    fn collect(root: &Path, filter: WalkFilter) -> Vec<PathBuf> {
        let mut paths: Vec<_> = Walker::new(root, filter).map(|f| f.unwrap().path).collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_walk_everything() {
        let temp_dir = tempfile::tempdir().unwrap();
        touch(temp_dir.path(), "Cars/BMW/body.mesh.dep");
        touch(temp_dir.path(), "Cars/BMW/body.mesh");
        touch(temp_dir.path(), "Game.gdt.dep");
        let paths = collect(temp_dir.path(), WalkFilter::default());
        assert_eq!(
            paths,
            vec![
                PathBuf::from("Cars/BMW/body.mesh"),
                PathBuf::from("Cars/BMW/body.mesh.dep"),
                PathBuf::from("Game.gdt.dep"),
            ]
        );
    }

    #[test]
    fn test_walk_filters() {
        let temp_dir = tempfile::tempdir().unwrap();
        touch(temp_dir.path(), "Cars/BMW/body.mesh.dep");
        touch(temp_dir.path(), "Cars/BMW/body.mesh");
        touch(temp_dir.path(), ".svn/entries.dep");
        touch(temp_dir.path(), "Fonts/ui.font.dep");
        touch(temp_dir.path(), "Fonts/ui.font.bak.dep");
        let filter = WalkFilter::new(Some(".dep"), &[r"^\.svn$"], &[r"\.bak\."]).unwrap();
        let paths = collect(temp_dir.path(), filter);
        assert_eq!(paths, vec![PathBuf::from("Cars/BMW/body.mesh.dep"), PathBuf::from("Fonts/ui.font.dep")]);
    }

    #[test]
    fn test_walk_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        for relative in ["b.dep", "Z/x.dep", "a.dep", "A/y.dep", "A/B/z.dep", "A/w.dep"] {
            touch(temp_dir.path(), relative);
        }
        let paths: Vec<_> = Walker::new(temp_dir.path(), WalkFilter::default()).map(|f| f.unwrap().path).collect();
        let expected = ["a.dep", "b.dep", "A/w.dep", "A/y.dep", "A/B/z.dep", "Z/x.dep"];
        assert_eq!(paths, expected.map(PathBuf::from));
    }

    #[test]
    fn test_walk_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(collect(&temp_dir.path().join("nope"), WalkFilter::default()).is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(WalkFilter::new(None, &["(unclosed"], &[] as &[&str]).is_err());
    }
}
