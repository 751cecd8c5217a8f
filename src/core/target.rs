//! Build target identity.
//!
//! A [`BuildTarget`] names the `(platform, architecture, configuration)`
//! triple a build is for. It is resolved once from the command line or
//! config and never changes afterwards.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::util::errors::BerthError;

/// Platform string used when neither the command line nor config names one.
pub const DEFAULT_PLATFORM: &str = "arm64-nx64";

/// A target platform, written `<arch>-<os>` (e.g. `arm64-nx64`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Platform {
    /// CPU architecture (arm64, x86_64, ...)
    pub arch: String,
    /// Operating system or console family (nx64, linux, ...)
    pub os: String,
}

impl Platform {
    /// Create a platform from its parts.
    pub fn new(arch: impl Into<String>, os: impl Into<String>) -> Self {
        Platform {
            arch: arch.into(),
            os: os.into(),
        }
    }

    /// Parse a platform string.
    ///
    /// The architecture is everything before the first `-`; the rest is the
    /// OS, so `x86_64-linux` parses as `(x86_64, linux)`.
    pub fn parse(s: &str) -> Result<Self, BerthError> {
        let s = s.trim();
        let invalid = |reason: &str| BerthError::InvalidTarget {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        // x86_64 contains an underscore, never a dash, so the first dash splits.
        let (arch, os) = s
            .split_once('-')
            .ok_or_else(|| invalid("expected `<arch>-<os>`"))?;

        if arch.is_empty() || os.is_empty() {
            return Err(invalid("architecture and OS must be non-empty"));
        }

        Ok(Platform::new(arch, os))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.arch, self.os)
    }
}

/// Build configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildConfiguration {
    #[default]
    Debug,
    Release,
}

impl BuildConfiguration {
    /// Lowercase name, as used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildConfiguration::Debug => "debug",
            BuildConfiguration::Release => "release",
        }
    }

    /// Capitalized name, as used in SDK directory layouts (`Debug`, `Release`).
    pub fn build_type(&self) -> &'static str {
        match self {
            BuildConfiguration::Debug => "Debug",
            BuildConfiguration::Release => "Release",
        }
    }
}

impl FromStr for BuildConfiguration {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(BuildConfiguration::Debug),
            "release" => Ok(BuildConfiguration::Release),
            _ => Err(BerthError::InvalidTarget {
                value: s.to_string(),
                reason: "configuration must be `debug` or `release`".to_string(),
            }),
        }
    }
}

impl fmt::Display for BuildConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved build target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BuildTarget {
    pub platform: Platform,
    pub configuration: BuildConfiguration,
}

impl BuildTarget {
    pub fn new(platform: Platform, configuration: BuildConfiguration) -> Self {
        BuildTarget {
            platform,
            configuration,
        }
    }

    /// Parse a platform string and pair it with a configuration.
    pub fn parse(platform: &str, configuration: BuildConfiguration) -> Result<Self, BerthError> {
        Ok(BuildTarget::new(Platform::parse(platform)?, configuration))
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.platform, self.configuration)
    }
}

/// What kind of linked artifact a set of flags is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A regular executable.
    Program,
    /// A test executable.
    Test,
    /// A static library.
    Library,
}

impl TargetKind {
    /// Whether the artifact goes through the linker as an executable.
    pub fn is_program(&self) -> bool {
        matches!(self, TargetKind::Program | TargetKind::Test)
    }
}
