//! Implementation of `berth package`.
//!
//! Each binary gets its own pipeline. Pipelines run in parallel on a rayon
//! pool; a failure in one never stops the others.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::builder::executor::{
    MessageFormat, PipelineExecutor, PipelineReport, ProcessRunner, StageRunner,
};
use crate::builder::pipeline::Pipeline;
use crate::builder::toolchain::ConfiguredToolchain;

/// Options for the package command.
#[derive(Debug, Clone, Default)]
pub struct PackageOptions {
    /// Linked binaries to package
    pub binaries: Vec<PathBuf>,

    /// Number of parallel pipelines (None = one per core)
    pub jobs: Option<usize>,

    /// How progress is reported
    pub format: MessageFormat,

    /// Skip stages whose inputs are unchanged
    pub incremental: bool,

    /// Directory copied into every package's data directory
    pub data_dir: Option<PathBuf>,
}

/// Outcome of packaging one binary.
#[derive(Debug)]
pub struct PackageOutcome {
    pub binary: PathBuf,
    pub result: Result<PipelineReport>,
}

/// Summary of a package run.
#[derive(Debug)]
pub struct PackageSummary {
    pub outcomes: Vec<PackageOutcome>,
    pub duration: Duration,
}

impl PackageSummary {
    pub fn succeeded(&self) -> impl Iterator<Item = &PipelineReport> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&Path, &anyhow::Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.binary.as_path(), e)))
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Package every binary in `opts` with the process runner.
pub fn package(setup: &ConfiguredToolchain, opts: &PackageOptions) -> Result<PackageSummary> {
    package_with(setup, &ProcessRunner, opts)
}

/// Package every binary in `opts`, running stage commands through `runner`.
pub fn package_with(
    setup: &ConfiguredToolchain,
    runner: &dyn StageRunner,
    opts: &PackageOptions,
) -> Result<PackageSummary> {
    if opts.binaries.is_empty() {
        bail!("no binaries to package");
    }

    let binaries = unique_binaries(&opts.binaries)?;
    let start = Instant::now();

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = opts.jobs {
        builder = builder.num_threads(jobs.max(1));
    }
    let pool = builder.build().context("failed to create worker pool")?;

    let progress = progress_bar(opts.format, binaries.len());

    let outcomes = pool.install(|| {
        binaries
            .par_iter()
            .map(|binary| {
                if let Some(pb) = &progress {
                    pb.set_message(binary.display().to_string());
                }
                let result = package_one(setup, runner, opts, binary);
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
                PackageOutcome {
                    binary: binary.clone(),
                    result,
                }
            })
            .collect::<Vec<_>>()
    });

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    Ok(PackageSummary {
        outcomes,
        duration: start.elapsed(),
    })
}

/// Drop repeated paths and reject distinct binaries whose outputs collide.
///
/// Two binaries with the same stem in one directory would write the same
/// code directory and fingerprint cache.
fn unique_binaries(binaries: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut seen: HashMap<(PathBuf, OsString), &PathBuf> = HashMap::new();
    let mut unique = Vec::new();

    for binary in binaries {
        let root = match binary.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let stem = binary.file_stem().map(OsString::from).unwrap_or_default();

        match seen.get(&(root.clone(), stem.clone())) {
            Some(&first) if first == binary => {
                tracing::debug!("ignoring repeated binary {}", binary.display());
            }
            Some(&first) => bail!(
                "{} and {} would package into the same bundle",
                first.display(),
                binary.display()
            ),
            None => {
                seen.insert((root, stem), binary);
                unique.push(binary.clone());
            }
        }
    }
    Ok(unique)
}

fn package_one(
    setup: &ConfiguredToolchain,
    runner: &dyn StageRunner,
    opts: &PackageOptions,
    binary: &Path,
) -> Result<PipelineReport> {
    let pipeline = Pipeline::derive_with_data(binary, setup, opts.data_dir.as_deref())?;
    PipelineExecutor::new(setup, runner)
        .message_format(opts.format)
        .incremental(opts.incremental)
        .execute(&pipeline)
}

fn progress_bar(format: MessageFormat, count: usize) -> Option<ProgressBar> {
    if format != MessageFormat::Human || count < 2 {
        return None;
    }

    let pb = ProgressBar::new(count as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    Some(pb)
}
