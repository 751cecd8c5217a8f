//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Berth - post-link packaging for console SDK cross builds
#[derive(Parser)]
#[command(name = "berth")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// SDK root (defaults to NINTENDO_SDK_ROOT, then config)
    #[arg(long, global = true, value_name = "DIR")]
    pub sdk_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the resolved SDK tool paths
    Toolchain(ToolchainArgs),

    /// Show compile/link flags for a target
    Flags(FlagsArgs),

    /// Show the packaging stages for a binary without running them
    Plan(PlanArgs),

    /// Package linked binaries
    Package(PackageArgs),

    /// Run a packaged program on the device
    Run(RunArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Target selection shared by every command.
#[derive(Args, Clone)]
pub struct TargetArgs {
    /// Platform to build for (e.g. arm64-nx64)
    #[arg(long, value_name = "PLATFORM")]
    pub target: Option<String>,

    /// Use the release configuration
    #[arg(short, long)]
    pub release: bool,
}

#[derive(Args)]
pub struct ToolchainArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args)]
pub struct FlagsArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Build target name (enables per-target adjustments)
    #[arg(long)]
    pub name: Option<String>,

    /// Treat the named target as a test
    #[arg(long, requires = "name")]
    pub test: bool,

    /// Treat the named target as a static library
    #[arg(long, requires = "name", conflicts_with = "test")]
    pub library: bool,

    /// Show compile flags only
    #[arg(long, conflicts_with = "link")]
    pub compile: bool,

    /// Show link flags only
    #[arg(long)]
    pub link: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Linked binary, or a target name without extension
    pub binary: PathBuf,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Directory copied into the package's data directory
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Emit the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PackageArgs {
    /// Linked binaries, or target names without extension
    #[arg(required = true)]
    pub binaries: Vec<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Number of parallel pipelines
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Directory copied into every package's data directory
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Rerun every stage even if its inputs are unchanged
    #[arg(long)]
    pub force: bool,

    /// Output format (human, json)
    #[arg(long, default_value = "human")]
    pub message_format: String,
}

#[derive(Args)]
pub struct RunArgs {
    /// Packaged program to run
    pub program: PathBuf,

    /// Arguments passed to the program (after `--`)
    #[arg(last = true)]
    pub args: Vec<String>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Print the launch command without running it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
