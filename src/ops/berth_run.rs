//! Implementation of `berth run`.
//!
//! Runs a packaged program on the device through the platform's launcher.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::builder::toolchain::{CommandSpec, ConfiguredToolchain};
use crate::util::process::{find_executable, ProcessBuilder};

/// Build the launch command for `program`.
///
/// The launcher is looked up on `PATH` when the pattern names it without
/// a directory; when it cannot be found the bare name is kept.
pub fn launch_command(
    setup: &ConfiguredToolchain,
    program: &Path,
    args: &[String],
) -> Result<CommandSpec> {
    let Some(mut cmd) = setup.tools.launch_command(program, args) else {
        bail!(
            "platform `{}` has no launcher for running programs",
            setup.platform_name()
        );
    };

    if cmd.program.components().count() == 1 {
        if let Some(found) = find_executable(&cmd.program.to_string_lossy()) {
            cmd.program = found;
        }
    }

    Ok(cmd)
}

/// Run `program` through the launcher and return its exit code.
pub fn run(setup: &ConfiguredToolchain, program: &Path, args: &[String]) -> Result<i32> {
    let cmd = launch_command(setup, program, args)?;
    tracing::info!("{:>12} `{}`", "Running", cmd.display());

    let status = ProcessBuilder::from_spec(&cmd)
        .status()
        .with_context(|| format!("failed to launch {}", program.display()))?;

    Ok(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeSdk;

    #[test]
    fn test_launch_command_substitutes_program_and_args() {
        let sdk = FakeSdk::new();
        let setup = sdk.setup();
        let cmd = launch_command(
            &setup,
            Path::new("out/test_core.nspd"),
            &["--filter".to_string(), "Core.*".to_string()],
        )
        .unwrap();

        assert!(cmd.program.ends_with("RunOnTarget.exe"));
        assert_eq!(cmd.args, vec!["out/test_core.nspd", "--filter", "Core.*"]);
    }
}
