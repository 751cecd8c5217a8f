//! Configuration file support for Berth.
//!
//! Berth supports two configuration file locations:
//! - Global: `~/.berth/config.toml` - User-wide defaults
//! - Project: `.berth/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::flags::{FlagKind, FlagSet};
use crate::core::target::BuildConfiguration;

/// Berth configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SDK settings
    pub sdk: SdkConfig,

    /// Build settings
    pub build: BuildConfig,

    /// Extra flags appended after the platform flags
    pub flags: FlagsConfig,

    /// Packaging settings
    pub package: PackageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// SDK root, used when `NINTENDO_SDK_ROOT` is unset.
    pub root: Option<PathBuf>,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Default number of parallel pipelines (None = auto-detect)
    pub jobs: Option<usize>,

    /// Default configuration (`debug` or `release`)
    pub configuration: Option<String>,

    /// Default platform (e.g. `arm64-nx64`)
    pub target: Option<String>,
}

/// Flags appended to every target's flag set, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagsConfig {
    pub cflags: Vec<String>,
    pub cxxflags: Vec<String>,
    pub ldflags: Vec<String>,
    pub defines: Vec<String>,
    pub includes: Vec<String>,
    pub libpaths: Vec<String>,
}

impl FlagsConfig {
    pub fn is_empty(&self) -> bool {
        self.lists().iter().all(|(_, values)| values.is_empty())
    }

    /// Append every configured flag to `flags`.
    pub fn apply(&self, flags: &mut FlagSet) {
        for (kind, values) in self.lists() {
            flags.extend(kind, values.iter().cloned());
        }
    }

    fn lists(&self) -> [(FlagKind, &Vec<String>); 6] {
        [
            (FlagKind::CFlags, &self.cflags),
            (FlagKind::CxxFlags, &self.cxxflags),
            (FlagKind::LinkFlags, &self.ldflags),
            (FlagKind::Defines, &self.defines),
            (FlagKind::CppPath, &self.includes),
            (FlagKind::LibPath, &self.libpaths),
        ]
    }

    fn merge(&mut self, other: FlagsConfig) {
        let FlagsConfig {
            cflags,
            cxxflags,
            ldflags,
            defines,
            includes,
            libpaths,
        } = other;
        self.cflags.extend(cflags);
        self.cxxflags.extend(cxxflags);
        self.ldflags.extend(ldflags);
        self.defines.extend(defines);
        self.includes.extend(includes);
        self.libpaths.extend(libpaths);
    }
}

/// Packaging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PackageConfig {
    /// Directory copied into every package's data directory.
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    ///
    /// Scalar settings are replaced; flag lists accumulate.
    pub fn merge(&mut self, other: Config) {
        if other.sdk.root.is_some() {
            self.sdk.root = other.sdk.root;
        }

        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.configuration.is_some() {
            self.build.configuration = other.build.configuration;
        }
        if other.build.target.is_some() {
            self.build.target = other.build.target;
        }

        self.flags.merge(other.flags);

        if other.package.data_dir.is_some() {
            self.package.data_dir = other.package.data_dir;
        }
    }

    /// Parse the configured build configuration, if any.
    pub fn configuration(&self) -> Result<Option<BuildConfiguration>> {
        self.build
            .configuration
            .as_deref()
            .map(|s| s.parse::<BuildConfiguration>())
            .transpose()
            .context("invalid `build.configuration` in config")
    }

    /// Resolve relative paths against the directory holding the config.
    fn rebase(&mut self, base: &Path) {
        if let Some(root) = &self.sdk.root {
            self.sdk.root = Some(base.join(root));
        }
        if let Some(dir) = &self.package.data_dir {
            self.package.data_dir = Some(base.join(dir));
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.berth/config.toml)
/// 2. Global config (~/.berth/config.toml)
/// 3. Defaults
///
/// Relative paths in a project config are resolved against the project
/// root, the directory containing `.berth/`.
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        let global = Config::load_or_default(global_path);
        config.merge(global);
    }

    if project_path.exists() {
        let mut project = Config::load_or_default(project_path);
        if let Some(root) = project_path.parent().and_then(Path::parent) {
            project.rebase(root);
        }
        config.merge(project);
    }

    config
}

/// Get the global berth config directory (~/.berth).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".berth"))
}

/// Get the global config path (~/.berth/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.berth/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".berth").join("config.toml")
}
