use crate::error::{ErrorKind, Result};
use crate::format::RecordFormat;
use databuild_hash::HashMethod;
use databuild_storage::WalkFilter;
use exn::ResultExt;
use serde::{Deserialize, Serialize};

/// How dependency records are named, hashed and stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// Appended to the main file's name to get its record's name.
    pub extension: String,
    /// Hash method for records created by the store.
    pub method: HashMethod,
    /// Format records are written in. Both are always readable.
    pub format: RecordFormat,
    /// Regexes matched against folder names skipped when scanning for records.
    pub folder_excludes: Vec<String>,
    /// Regexes matched against file names skipped when scanning for records.
    pub file_excludes: Vec<String>,
}
impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            extension: ".dep".to_string(),
            method: HashMethod::Timestamp,
            format: RecordFormat::Text,
            folder_excludes: Vec::new(),
            file_excludes: Vec::new(),
        }
    }
}
impl DependencyConfig {
    pub fn walk_filter(&self) -> Result<WalkFilter> {
        WalkFilter::new(Some(self.extension.as_str()), self.folder_excludes.as_slice(), self.file_excludes.as_slice())
            .or_raise(|| ErrorKind::Config)
    }
}
