//! Resolving the toolchain for a command invocation.
//!
//! Command-line options win over config files, which win over defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::toolchain::{configure, ConfiguredToolchain, SDK_ROOT_ENV};
use crate::core::target::{BuildConfiguration, BuildTarget, DEFAULT_PLATFORM};
use crate::util::config::Config;

/// Target selection shared by every command that needs a toolchain.
#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    /// Platform such as `arm64-nx64` (None = config, then default)
    pub target: Option<String>,

    /// Build in release mode
    pub release: bool,

    /// Explicit SDK root, ahead of the environment and config
    pub sdk_root: Option<PathBuf>,
}

/// Build target selected by `opts` and `config`.
pub fn select_target(config: &Config, opts: &SetupOptions) -> Result<BuildTarget> {
    let platform = opts
        .target
        .as_deref()
        .or(config.build.target.as_deref())
        .unwrap_or(DEFAULT_PLATFORM);

    let configuration = if opts.release {
        BuildConfiguration::Release
    } else {
        config.configuration()?.unwrap_or_default()
    };

    Ok(BuildTarget::parse(platform, configuration)?)
}

/// SDK root override: the command line, else the config file when the
/// environment variable is unset.
fn sdk_override(config: &Config, opts: &SetupOptions) -> Option<PathBuf> {
    if opts.sdk_root.is_some() {
        return opts.sdk_root.clone();
    }
    if std::env::var_os(SDK_ROOT_ENV).is_some() {
        return None;
    }
    config.sdk.root.clone()
}

/// Resolve the configured toolchain for this invocation.
pub fn setup(config: &Config, opts: &SetupOptions) -> Result<ConfiguredToolchain> {
    let target = select_target(config, opts)?;
    let root = sdk_override(config, opts);

    let setup = configure(&target, root.as_deref(), &config.flags)
        .with_context(|| format!("failed to configure toolchain for {}", target))?;

    tracing::debug!(
        "using {} toolchain from {}",
        setup.platform_name(),
        setup.tools.sdk_root().display()
    );
    Ok(setup)
}

/// Linked binary for a command-line argument.
///
/// A path without an extension names a build target and maps to the
/// platform's program file, so `out/game` becomes `out/game.nss`.
pub fn binary_for(setup: &ConfiguredToolchain, arg: &Path) -> PathBuf {
    match (arg.extension(), arg.file_name()) {
        (None, Some(name)) => {
            arg.with_file_name(setup.patterns.program_name(&name.to_string_lossy()))
        }
        _ => arg.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::errors::BerthError;
    use tempfile::TempDir;

    #[test]
    fn test_select_target_defaults() {
        let target = select_target(&Config::default(), &SetupOptions::default()).unwrap();
        assert_eq!(target.platform.to_string(), DEFAULT_PLATFORM);
        assert_eq!(target.configuration, BuildConfiguration::Debug);
    }

    #[test]
    fn test_select_target_precedence() {
        let mut config = Config::default();
        config.build.configuration = Some("release".to_string());
        config.build.target = Some("arm64-nx64".to_string());

        let target = select_target(&config, &SetupOptions::default()).unwrap();
        assert_eq!(target.configuration, BuildConfiguration::Release);

        let opts = SetupOptions {
            target: Some("x86_64-linux".to_string()),
            ..Default::default()
        };
        let target = select_target(&config, &opts).unwrap();
        assert_eq!(target.platform.arch, "x86_64");
    }

    #[test]
    fn test_setup_with_explicit_root() {
        let tmp = TempDir::new().unwrap();
        let opts = SetupOptions {
            sdk_root: Some(tmp.path().to_path_buf()),
            release: true,
            ..Default::default()
        };
        let setup = setup(&Config::default(), &opts).unwrap();
        assert_eq!(setup.target.configuration, BuildConfiguration::Release);
        assert_eq!(setup.platform_name(), "arm64-nx64");
    }

    #[test]
    fn test_binary_for_target_name() {
        let tmp = TempDir::new().unwrap();
        let opts = SetupOptions {
            sdk_root: Some(tmp.path().to_path_buf()),
            ..Default::default()
        };
        let setup = setup(&Config::default(), &opts).unwrap();

        assert_eq!(
            binary_for(&setup, Path::new("out/game")),
            PathBuf::from("out/game.nss")
        );
        assert_eq!(
            binary_for(&setup, Path::new("out/game.elf")),
            PathBuf::from("out/game.elf")
        );
    }

    #[test]
    fn test_setup_unsupported_platform() {
        let tmp = TempDir::new().unwrap();
        let opts = SetupOptions {
            target: Some("x86_64-linux".to_string()),
            sdk_root: Some(tmp.path().to_path_buf()),
            ..Default::default()
        };
        let err = setup(&Config::default(), &opts).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BerthError>(),
            Some(BerthError::UnsupportedPlatform { .. })
        ));
    }
}
