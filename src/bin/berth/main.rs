//! Berth CLI - post-link packaging for console SDK cross builds

use anyhow::Result;
use berth::BerthError;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

/// Exit code for configuration problems; packaging failures exit with 1.
const EXIT_CONFIG: i32 = 2;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        let config_error = e
            .downcast_ref::<BerthError>()
            .into_iter()
            .chain(e.chain().filter_map(|cause| cause.downcast_ref::<BerthError>()))
            .any(BerthError::is_configuration);
        std::process::exit(if config_error { EXIT_CONFIG } else { 1 });
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // BERTH_LOG wins over --verbose
    let filter = EnvFilter::try_from_env("BERTH_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("berth=debug")
        } else {
            EnvFilter::new("berth=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let global = commands::GlobalArgs {
        verbose: cli.verbose,
        sdk_root: cli.sdk_root,
    };

    match cli.command {
        Commands::Toolchain(args) => commands::toolchain::execute(&global, args),
        Commands::Flags(args) => commands::flags::execute(&global, args),
        Commands::Plan(args) => commands::plan::execute(&global, args),
        Commands::Package(args) => commands::package::execute(&global, args),
        Commands::Run(args) => commands::run::execute(&global, args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
