//! The local dependency store plus the stores of other machines.
//!
//! A remote scope is another machine's build output (typically a network
//! share). When one of them has an up-to-date record for a main file, its
//! outputs can be copied instead of rebuilding locally.

use crate::config::DependencyConfig;
use crate::error::Result;
use crate::store::DependencyStore;
use databuild_hash::HashPool;
use std::path::{Path, PathBuf};

/// Which store a modification query is answered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    Remote,
}

#[derive(Debug)]
pub struct DependencySystem {
    local: DependencyStore,
    remotes: Vec<DependencyStore>,
}
impl DependencySystem {
    pub fn new(local: DependencyStore) -> Self {
        Self { local, remotes: Vec::new() }
    }

    pub fn local(&self) -> &DependencyStore {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut DependencyStore {
        &mut self.local
    }

    pub fn remotes(&self) -> &[DependencyStore] {
        &self.remotes
    }

    /// Register another machine's roots. Only accepted when all three exist;
    /// returns whether it was.
    pub fn add_remote(
        &mut self,
        src: impl Into<PathBuf>,
        dst: impl Into<PathBuf>,
        dep: impl Into<PathBuf>,
        config: DependencyConfig,
    ) -> bool {
        let roots: [PathBuf; 3] = [src.into(), dst.into(), dep.into()];
        if let Some(missing) = roots.iter().find(|root| !root.is_dir()) {
            tracing::info!(root = %missing.display(), "Ignoring remote dependency scope; folder does not exist");
            return false;
        }
        let [src, dst, dep] = roots;
        self.remotes.push(DependencyStore::new(src, dst, dep, config));
        true
    }

    /// Load every scope's records. Stops at the first scope that fails.
    pub fn load(&mut self) -> Result<usize> {
        let mut total = self.local.load()?;
        for remote in &mut self.remotes {
            total += remote.load()?;
        }
        Ok(total)
    }

    pub fn update(&mut self, pool: &HashPool) {
        self.local.update(pool);
        self.remotes.iter_mut().for_each(|remote| remote.update(pool));
    }

    pub fn is_modified(&mut self, main: impl AsRef<Path>) -> bool {
        self.local.is_modified(main)
    }

    pub fn is_modified_with_key(&mut self, main: impl AsRef<Path>, user_key: &str) -> bool {
        self.local.is_modified_with_key(main, user_key)
    }

    /// Ask a particular scope. For [`Scope::Remote`] the answer is "not
    /// modified" only if some remote holds an up-to-date record.
    pub fn is_modified_in(&mut self, main: impl AsRef<Path>, user_key: &str, scope: Scope) -> bool {
        match scope {
            Scope::Local => self.local.is_modified_with_key(main, user_key),
            Scope::Remote => self.find_reusable_remote(main, user_key).is_none(),
        }
    }

    /// The first remote scope whose record for `main` is up to date.
    pub fn find_reusable_remote(&mut self, main: impl AsRef<Path>, user_key: &str) -> Option<&DependencyStore> {
        let main = main.as_ref();
        let index = self.remotes.iter_mut().position(|remote| !remote.is_modified_with_key(main, user_key))?;
        self.remotes.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use databuild_hash::HashMethod;
    use std::fs;

    fn config() -> DependencyConfig {
        DependencyConfig { method: HashMethod::ContentHash, ..DependencyConfig::default() }
    }

    /// A machine that has built `Fonts/ui.font` into `ui.bin`.
    fn machine(root: &Path) -> [PathBuf; 3] {
        let [src, dst, dep] = ["Src", "Dst", "Dep"].map(|d| root.join(d));
        fs::create_dir_all(src.join("Fonts")).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(src.join("Fonts/ui.font"), b"font").unwrap();
        fs::write(dst.join("ui.bin"), b"built").unwrap();
        let mut store = DependencyStore::new(&src, &dst, &dep, config());
        store.set("Fonts/ui.font", &["ui.bin"]);
        store.save().unwrap();
        [src, dst, dep]
    }

    #[test]
    fn test_remote_requires_existing_roots() {
        let temp_dir = tempfile::tempdir().unwrap();
        let local = DependencyStore::new("Src", "Dst", "Dep", config());
        let mut system = DependencySystem::new(local);
        let root = temp_dir.path();
        assert!(!system.add_remote(root, root, root.join("missing"), config()));
        assert!(system.add_remote(root, root, root, config()));
        assert_eq!(system.remotes().len(), 1);
    }

    #[test]
    fn test_without_remotes_everything_is_modified() {
        let temp_dir = tempfile::tempdir().unwrap();
        let [src, dst, dep] = machine(temp_dir.path());
        let mut system = DependencySystem::new(DependencyStore::new(src, dst, dep, config()));
        system.load().unwrap();
        assert!(!system.is_modified_in("Fonts/ui.font", "", Scope::Local));
        assert!(system.is_modified_in("Fonts/ui.font", "", Scope::Remote));
    }

    #[test]
    fn test_reusable_remote() {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        let stale_dir = tempfile::tempdir().unwrap();
        let local = DependencyStore::new(
            local_dir.path().join("Src"),
            local_dir.path().join("Dst"),
            local_dir.path().join("Dep"),
            config(),
        );
        let mut system = DependencySystem::new(local);
        // A machine whose output has since been deleted, then a good one.
        let [src, dst, dep] = machine(stale_dir.path());
        fs::remove_file(dst.join("ui.bin")).unwrap();
        assert!(system.add_remote(src, dst, dep, config()));
        let [src, dst, dep] = machine(remote_dir.path());
        assert!(system.add_remote(src, dst, &dep, config()));
        system.load().unwrap();
        system.update(&HashPool::global());

        assert!(system.is_modified("Fonts/ui.font"));
        assert!(!system.is_modified_in("Fonts/ui.font", "", Scope::Remote));
        let remote = system.find_reusable_remote("Fonts/ui.font", "").unwrap();
        assert_eq!(remote.dep(), dep);
        assert!(system.find_reusable_remote("Fonts/other.font", "").is_none());
    }
}
