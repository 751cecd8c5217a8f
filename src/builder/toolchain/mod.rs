//! Cross-compilation toolchain configuration.
//!
//! A private platform contributes a [`PlatformToolchain`] that knows where
//! its SDK keeps compilers and command line tools, which flags the platform
//! mandates, and which SDK files go into a package. [`configure`] resolves
//! all of that once, from the SDK root, into a [`ConfiguredToolchain`] that
//! is read-only for the rest of the build.
//!
//! Resolution order for the SDK root:
//! 1. An explicit override (`--sdk-root`)
//! 2. The `NINTENDO_SDK_ROOT` environment variable
//! 3. `[sdk] root` in `.berth/config.toml` or `~/.berth/config.toml`

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::builder::template::TemplateVars;
use crate::core::{BuildTarget, FlagSet, Platform, TargetKind};
use crate::util::config::FlagsConfig;
use crate::util::errors::BerthError;

mod nx64;

pub use nx64::Nx64Toolchain;

/// Environment variable holding the SDK root.
pub const SDK_ROOT_ENV: &str = "NINTENDO_SDK_ROOT";

/// Role a tool plays in the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ToolRole {
    /// C compiler
    Cc,
    /// C++ compiler
    Cxx,
    /// C++ link driver
    LinkCxx,
    /// Preprocessor (the C compiler invoked with `-E`)
    Cpp,
    /// Archiver
    Ar,
    /// Archive indexer
    Ranlib,
    /// Linker
    Ld,
    /// Converts a linked binary into the native executable format
    Converter,
    /// Generates the application metadata descriptor
    MetadataGenerator,
    /// Validates and seals an assembled bundle
    AuthoringTool,
}

impl ToolRole {
    pub const ALL: [ToolRole; 10] = [
        ToolRole::Cc,
        ToolRole::Cxx,
        ToolRole::LinkCxx,
        ToolRole::Cpp,
        ToolRole::Ar,
        ToolRole::Ranlib,
        ToolRole::Ld,
        ToolRole::Converter,
        ToolRole::MetadataGenerator,
        ToolRole::AuthoringTool,
    ];

    /// Variable name used for this tool in command templates.
    pub fn var_name(&self) -> &'static str {
        match self {
            ToolRole::Cc => "CC",
            ToolRole::Cxx => "CXX",
            ToolRole::LinkCxx => "LINK_CXX",
            ToolRole::Cpp => "CPP",
            ToolRole::Ar => "AR",
            ToolRole::Ranlib => "RANLIB",
            ToolRole::Ld => "LD",
            ToolRole::Converter => "MAKENSO",
            ToolRole::MetadataGenerator => "MAKEMETA",
            ToolRole::AuthoringTool => "AUTHORINGTOOL",
        }
    }
}

impl fmt::Display for ToolRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.var_name())
    }
}

/// A command to execute, with program, arguments, and environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    /// The program to run
    pub program: PathBuf,
    /// Command arguments
    pub args: Vec<String>,
    /// Environment variables to set
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Create a new command spec.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Render as a single line for logs and error messages.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Output file name patterns; `%s` is replaced by the target name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPatterns {
    /// Linked program, e.g. `%s.nss`
    pub program: String,
    /// Final package directory, e.g. `%s.nspd`
    pub bundle: String,
}

impl OutputPatterns {
    pub fn program_name(&self, name: &str) -> String {
        self.program.replace("%s", name)
    }

    pub fn bundle_name(&self, name: &str) -> String {
        self.bundle.replace("%s", name)
    }
}

/// SDK-provided files consumed by the packaging stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportFiles {
    /// Application descriptor template (`Application.desc`)
    pub descriptor: PathBuf,
    /// Application metadata template (`*.nmeta`)
    pub metadata: PathBuf,
    /// Runtime loader copied into every bundle
    pub runtime_loader: PathBuf,
    /// Shared SDK object copied into every bundle
    pub sdk_object: PathBuf,
}

/// Absolute tool paths for one build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainConfig {
    sdk_root: PathBuf,
    tools: BTreeMap<ToolRole, PathBuf>,
    test_launch_pattern: Option<String>,
}

impl ToolchainConfig {
    pub fn new(sdk_root: impl Into<PathBuf>) -> Self {
        ToolchainConfig {
            sdk_root: sdk_root.into(),
            tools: BTreeMap::new(),
            test_launch_pattern: None,
        }
    }

    pub fn with_tool(mut self, role: ToolRole, path: impl Into<PathBuf>) -> Self {
        self.tools.insert(role, path.into());
        self
    }

    /// Set the pattern used to launch programs on the device: `<launcher> %s %s`
    /// where the first `%s` is the program and the second its arguments.
    pub fn with_test_launch_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.test_launch_pattern = Some(pattern.into());
        self
    }

    pub fn sdk_root(&self) -> &Path {
        &self.sdk_root
    }

    /// Path of the tool for `role`.
    pub fn tool(&self, role: ToolRole) -> Result<&Path, BerthError> {
        self.tools
            .get(&role)
            .map(PathBuf::as_path)
            .ok_or(BerthError::MissingTool {
                role: role.var_name(),
            })
    }

    /// All configured tools, in role order.
    pub fn tools(&self) -> impl Iterator<Item = (ToolRole, &Path)> {
        self.tools.iter().map(|(role, path)| (*role, path.as_path()))
    }

    /// A ready-to-extend command for `role`.
    pub fn command(&self, role: ToolRole) -> Result<CommandSpec, BerthError> {
        let cmd = CommandSpec::new(self.tool(role)?);
        Ok(match role {
            ToolRole::Cpp => cmd.arg("-E"),
            _ => cmd,
        })
    }

    /// Template variables for every configured tool (`${MAKENSO}`, ...).
    pub fn template_vars(&self) -> TemplateVars {
        let mut vars = TemplateVars::new();
        for (role, path) in &self.tools {
            vars.set(role.var_name(), path.display().to_string());
        }
        vars
    }

    pub fn test_launch_pattern(&self) -> Option<&str> {
        self.test_launch_pattern.as_deref()
    }

    /// Build the command that runs `program` on the device.
    ///
    /// Returns `None` when the platform has no launcher.
    pub fn launch_command(&self, program: &Path, args: &[String]) -> Option<CommandSpec> {
        let pattern = self.test_launch_pattern.as_deref()?;
        let mut tokens = pattern.split_whitespace();
        let launcher = tokens.next()?;

        let mut cmd = CommandSpec::new(launcher);
        let mut slot = 0;
        for token in tokens {
            if token == "%s" {
                match slot {
                    0 => cmd = cmd.arg(program.display().to_string()),
                    _ => cmd = cmd.args(args.iter().cloned()),
                }
                slot += 1;
            } else {
                cmd = cmd.arg(token);
            }
        }
        Some(cmd)
    }
}

/// Platform-specific toolchain knowledge.
pub trait PlatformToolchain: fmt::Debug + Send + Sync {
    /// Platform string this toolchain serves (e.g. `arm64-nx64`).
    fn name(&self) -> &'static str;

    /// Resolve tool paths under the SDK root.
    fn tools(&self, sdk_root: &Path) -> ToolchainConfig;

    /// Platform-mandated flags for a target.
    fn flags(&self, sdk_root: &Path, target: &BuildTarget) -> FlagSet;

    /// SDK files the packaging stages consume.
    fn support_files(&self, sdk_root: &Path) -> SupportFiles;

    /// Output name patterns.
    fn output_patterns(&self) -> OutputPatterns;

    /// Adjust flags for a single build target. Default: no changes.
    fn adjust_target_flags(&self, flags: &mut FlagSet, name: &str, kind: TargetKind) {
        let _ = (flags, name, kind);
    }
}

/// Look up the toolchain for a platform.
pub fn toolchain_for(platform: &Platform) -> Result<Arc<dyn PlatformToolchain>, BerthError> {
    match (platform.arch.as_str(), platform.os.as_str()) {
        ("arm64", "nx64") => Ok(Arc::new(Nx64Toolchain)),
        _ => Err(BerthError::UnsupportedPlatform {
            platform: platform.to_string(),
        }),
    }
}

/// Whether Berth carries an SDK extension for `platform`.
pub fn is_platform_private(platform: &str) -> bool {
    Platform::parse(platform)
        .map(|p| toolchain_for(&p).is_ok())
        .unwrap_or(false)
}

/// Convert backslashes to forward slashes.
///
/// Compiler version probing fails silently on Windows-style separators, so
/// every SDK path goes through this first.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Resolve the SDK root from an explicit override or `NINTENDO_SDK_ROOT`.
pub fn resolve_sdk_root(override_root: Option<&Path>) -> Result<PathBuf, BerthError> {
    let raw = match override_root {
        Some(path) => path.to_string_lossy().into_owned(),
        None => std::env::var(SDK_ROOT_ENV)
            .map_err(|_| BerthError::MissingSdkRoot { var: SDK_ROOT_ENV })?,
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return Err(BerthError::MissingSdkRoot { var: SDK_ROOT_ENV });
    }

    let mut normalized = normalize_separators(raw);
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }

    let root = PathBuf::from(normalized);
    if !root.is_dir() {
        return Err(BerthError::SdkRootNotFound { path: root });
    }

    Ok(root)
}

/// Join a `/`-separated relative path onto `base`, keeping forward slashes.
pub(crate) fn sdk_path(base: &Path, rel: &str) -> PathBuf {
    PathBuf::from(format!("{}/{}", normalize_separators(&base.to_string_lossy()), rel))
}

/// Toolchain, flags, and support files resolved for one build target.
#[derive(Debug, Clone)]
pub struct ConfiguredToolchain {
    pub target: BuildTarget,
    pub tools: ToolchainConfig,
    pub flags: FlagSet,
    pub support: SupportFiles,
    pub patterns: OutputPatterns,
    platform: Arc<dyn PlatformToolchain>,
}

impl ConfiguredToolchain {
    /// Name of the platform toolchain in use.
    pub fn platform_name(&self) -> &'static str {
        self.platform.name()
    }

    /// Flags for one build target, with platform per-target adjustments.
    pub fn target_flags(&self, name: &str, kind: TargetKind) -> FlagSet {
        let mut flags = self.flags.clone();
        self.platform.adjust_target_flags(&mut flags, name, kind);
        flags
    }
}

/// Resolve the toolchain for `target`.
///
/// `extra` flags from config are appended after the platform flags with
/// the same unique semantics.
pub fn configure(
    target: &BuildTarget,
    sdk_root: Option<&Path>,
    extra: &FlagsConfig,
) -> Result<ConfiguredToolchain, BerthError> {
    let platform = toolchain_for(&target.platform)?;
    let root = resolve_sdk_root(sdk_root)?;

    tracing::debug!("configuring {} with SDK at {}", target, root.display());

    let tools = platform.tools(&root);
    let mut flags = platform.flags(&root, target);
    extra.apply(&mut flags);

    Ok(ConfiguredToolchain {
        target: target.clone(),
        tools,
        flags,
        support: platform.support_files(&root),
        patterns: platform.output_patterns(),
        platform,
    })
}
