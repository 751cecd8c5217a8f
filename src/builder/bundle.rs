//! Package bundle layout and assembly.
//!
//! A package for binary `<stem>` is laid out next to the binary:
//!
//! ```text
//! <stem>.code/main          converted executable
//! <stem>.code/main.npdm     generated metadata
//! <stem>.code/rtld          SDK runtime loader
//! <stem>.code/sdk           SDK shared object
//! <stem>.data/              application data
//! <stem>.nspd/control0.ncd/data/control.nacp   authoring output
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::util::errors::BerthError;
use crate::util::fs::copy_preserving;

/// Suffix of the code directory handed to the authoring tool.
pub const CODE_DIR_SUFFIX: &str = ".code";
/// Suffix of the data directory handed to the authoring tool.
pub const DATA_DIR_SUFFIX: &str = ".data";

/// Logical role of a file or directory inside a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleRole {
    Main,
    Metadata,
    RuntimeLoader,
    SdkObject,
    Control,
    Data,
}

impl BundleRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleRole::Main => "main",
            BundleRole::Metadata => "metadata",
            BundleRole::RuntimeLoader => "runtime-loader",
            BundleRole::SdkObject => "sdk-object",
            BundleRole::Control => "control",
            BundleRole::Data => "data",
        }
    }
}

impl fmt::Display for BundleRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed mapping from bundle roles to paths relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    stem: String,
    package_dir: String,
}

impl BundleLayout {
    /// Layout for binary `stem` whose package directory is `package_dir`
    /// (e.g. `game.nspd`).
    pub fn new(stem: impl Into<String>, package_dir: impl Into<String>) -> Self {
        BundleLayout {
            stem: stem.into(),
            package_dir: package_dir.into(),
        }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn code_dir(&self) -> String {
        format!("{}{}", self.stem, CODE_DIR_SUFFIX)
    }

    pub fn data_dir(&self) -> String {
        format!("{}{}", self.stem, DATA_DIR_SUFFIX)
    }

    pub fn package_dir(&self) -> &str {
        &self.package_dir
    }

    /// Directory the authoring tool writes the control file into.
    pub fn control_dir(&self) -> String {
        format!("{}/control0.ncd/data", self.package_dir)
    }

    /// Relative destination of `role`.
    pub fn relative(&self, role: BundleRole) -> String {
        match role {
            BundleRole::Main => format!("{}/main", self.code_dir()),
            BundleRole::Metadata => format!("{}/main.npdm", self.code_dir()),
            BundleRole::RuntimeLoader => format!("{}/rtld", self.code_dir()),
            BundleRole::SdkObject => format!("{}/sdk", self.code_dir()),
            BundleRole::Control => format!("{}/control.nacp", self.control_dir()),
            BundleRole::Data => self.data_dir(),
        }
    }

    /// Absolute destination of `role` under `root`.
    pub fn resolve(&self, root: &Path, role: BundleRole) -> PathBuf {
        root.join(self.relative(role))
    }
}

/// One file copied into the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleCopy {
    pub role: BundleRole,
    pub from: PathBuf,
    pub to: PathBuf,
}

impl BundleCopy {
    pub fn new(role: BundleRole, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        BundleCopy {
            role,
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Copy every bundle input to its destination.
///
/// All sources are checked before anything is copied, so a missing input
/// leaves the bundle untouched and the error names that input. A failed
/// copy stops the assembly immediately.
pub fn assemble(copies: &[BundleCopy]) -> Result<()> {
    if let Some(missing) = copies.iter().find(|c| !c.from.is_file()) {
        return Err(BerthError::MissingBundleInput {
            path: missing.from.clone(),
        }
        .into());
    }

    for copy in copies {
        tracing::debug!(
            "bundling {} {} -> {}",
            copy.role,
            copy.from.display(),
            copy.to.display()
        );
        copy_preserving(&copy.from, &copy.to)?;
    }
    Ok(())
}
