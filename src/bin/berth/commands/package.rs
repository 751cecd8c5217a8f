//! `berth package` command

use anyhow::{anyhow, bail, Result};

use berth::builder::MessageFormat;
use berth::ops::{self, PackageOptions};

use super::{GlobalArgs, Session};
use crate::cli::PackageArgs;

pub fn execute(global: &GlobalArgs, args: PackageArgs) -> Result<()> {
    let format: MessageFormat = args.message_format.parse().map_err(|e: String| anyhow!(e))?;
    let session = Session::open(global, &args.target)?;

    let opts = PackageOptions {
        binaries: args
            .binaries
            .iter()
            .map(|b| ops::binary_for(&session.setup, &session.ctx.resolve(b)))
            .collect(),
        jobs: args.jobs.or(session.config.build.jobs),
        format,
        incremental: !args.force,
        data_dir: session.data_dir(args.data_dir.as_ref()),
    };

    let summary = ops::package(&session.setup, &opts)?;

    if format == MessageFormat::Human {
        for report in summary.succeeded() {
            let fresh = if report.fresh_count() == report.stages.len() {
                " (fresh)"
            } else {
                ""
            };
            tracing::info!(
                "{:>12} {}{}",
                "Packaged",
                report.bundle.display(),
                fresh
            );
            if session.ctx.is_verbose() {
                for stage in &report.stages {
                    let state = if stage.fresh { "fresh" } else { "ran" };
                    tracing::debug!(
                        "{:>12} {} {} in {:.2}s",
                        stage.kind.as_str(),
                        report.binary.display(),
                        state,
                        stage.duration.as_secs_f64()
                    );
                }
            }
        }
    }

    let failed: Vec<_> = summary.failed().collect();
    if failed.is_empty() {
        if format == MessageFormat::Human {
            tracing::info!(
                "{:>12} {} package(s) in {:.2}s",
                "Finished",
                summary.outcomes.len(),
                summary.duration.as_secs_f64()
            );
        }
        return Ok(());
    }

    for (binary, err) in &failed {
        eprintln!("error: {}: {:#}", binary.display(), err);
    }
    bail!(
        "{} of {} package(s) failed",
        failed.len(),
        summary.outcomes.len()
    )
}
