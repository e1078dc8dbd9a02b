//! Layered configuration for the data build tools.
//!
//! Values are merged in increasing precedence: built-in defaults, a config
//! file (TOML, YAML or JSON), `DATABUILD_`-prefixed environment variables
//! (`__` separates nested keys, e.g. `DATABUILD_BIGFILE__FILE_ALIGNMENT`)
//! and finally whatever was given on the command line.
//!
//! The result is built once at startup and passed down by reference.

pub mod error;

use crate::error::{ErrorKind, Result};
use databuild_bigfile::BigfileConfig;
use databuild_depend::DependencyConfig;
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "DATABUILD_";

/// Roots every relative path is resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Source assets.
    pub src: PathBuf,
    /// Compiled data, node files and the file entry cache.
    pub dst: PathBuf,
    /// Dependency records.
    pub dep: PathBuf,
    /// Published archives.
    #[serde(rename = "pub")]
    pub publish: PathBuf,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            src: PathBuf::from("Assets"),
            dst: PathBuf::from("Bin.%PLATFORM%"),
            dep: PathBuf::from("Dep.%PLATFORM%"),
            publish: PathBuf::from("Publish.%PLATFORM%"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base name of the archive and its node file.
    pub name: String,
    pub platform: String,
    pub paths: Paths,
    /// Write the archive payload too. Off by default: only the tables are
    /// written unless asked for.
    pub build_bigfile: bool,
    /// Hashing threads; `0` uses one per core.
    pub threads: usize,
    pub bigfile: BigfileConfig,
    pub dependency: DependencyConfig,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::new(),
            platform: "PC".to_string(),
            paths: Paths::default(),
            build_bigfile: false,
            threads: 0,
            bigfile: BigfileConfig::default(),
            dependency: DependencyConfig::default(),
        }
    }
}

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub paths: PathOverrides,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_bigfile: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PathOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dep: Option<PathBuf>,
    #[serde(rename = "pub", skip_serializing_if = "Option::is_none")]
    pub publish: Option<PathBuf>,
}

impl Config {
    /// Merge every layer, expand placeholders and validate the result.
    ///
    /// Without an explicit `file`, `config.toml` in the platform's config
    /// directory is used when it exists.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let file = match file {
            Some(file) if !file.is_file() => exn::bail!(ErrorKind::NotFound(file.to_path_buf())),
            Some(file) => Some(file.to_path_buf()),
            None => default_config_file().filter(|file| file.is_file()),
        };
        let mut config: Self = Self::figment(file.as_deref(), overrides)?.extract().or_raise(|| ErrorKind::Load)?;
        config.expand_placeholders();
        config.validate()?;
        tracing::debug!(file = ?file, name = %config.name, platform = %config.platform, "Loaded configuration");
        Ok(config)
    }

    /// The merged layers, before extraction.
    pub fn figment(file: Option<&Path>, overrides: &Overrides) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            let extension = file.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        Ok(figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides)))
    }

    /// Replace `%NAME%` and `%PLATFORM%` in the configured paths.
    pub fn expand_placeholders(&mut self) {
        let expand = |path: &Path| {
            let expanded = path.to_string_lossy().replace("%NAME%", &self.name).replace("%PLATFORM%", &self.platform);
            PathBuf::from(expanded)
        };
        self.paths = Paths {
            src: expand(&self.paths.src),
            dst: expand(&self.paths.dst),
            dep: expand(&self.paths.dep),
            publish: expand(&self.paths.publish),
        };
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("name must not be empty".to_string()));
        }
        if self.bigfile.file_alignment == 0 {
            exn::bail!(ErrorKind::Invalid("bigfile.file_alignment must be at least 1".to_string()));
        }
        self.dependency
            .walk_filter()
            .or_raise(|| ErrorKind::Invalid("dependency exclusion patterns don't compile".to_string()))?;
        Ok(())
    }
}

pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", "databuild").map(|dirs| dirs.config_dir().join("config.toml"))
}
