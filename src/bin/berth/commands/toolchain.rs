//! `berth toolchain` command

use anyhow::Result;

use super::{GlobalArgs, Session};
use crate::cli::ToolchainArgs;

pub fn execute(global: &GlobalArgs, args: ToolchainArgs) -> Result<()> {
    let session = Session::open(global, &args.target)?;
    let setup = &session.setup;

    println!("Target:   {}", setup.target);
    println!("Platform: {}", setup.platform_name());
    println!("SDK root: {}", setup.tools.sdk_root().display());
    println!();

    println!("Tools:");
    for (role, path) in setup.tools.tools() {
        let marker = if path.exists() { "" } else { "  (missing)" };
        let command = setup.tools.command(role)?;
        println!("  {:<14} {}{}", role.var_name(), command.display(), marker);
    }

    println!();
    println!(
        "Outputs:  {} -> {}",
        setup.patterns.program_name("<name>"),
        setup.patterns.bundle_name("<name>")
    );

    println!();
    println!("Support files:");
    for (name, path) in [
        ("descriptor", &setup.support.descriptor),
        ("metadata", &setup.support.metadata),
        ("runtime loader", &setup.support.runtime_loader),
        ("sdk object", &setup.support.sdk_object),
    ] {
        let marker = if path.exists() { "" } else { "  (missing)" };
        println!("  {:<14} {}{}", name, path.display(), marker);
    }

    if let Some(pattern) = setup.tools.test_launch_pattern() {
        println!();
        println!("Launcher: {}", pattern);
    }

    Ok(())
}
