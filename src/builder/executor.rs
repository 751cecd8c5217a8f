//! Pipeline executor.
//!
//! Runs one binary's stages synchronously in dependency order. A stage
//! starts only after the stage it names in `after` has completed and
//! produced every declared output; the first failure ends the pipeline.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::builder::bundle;
use crate::builder::events::PackageEvent;
use crate::builder::fingerprint::{FingerprintCache, StageFingerprint};
use crate::builder::pipeline::{Pipeline, PipelineState, Stage, StageAction, StageKind};
use crate::builder::toolchain::{CommandSpec, ConfiguredToolchain};
use crate::builder::tree::BuildTree;
use crate::util::errors::BerthError;
use crate::util::fs::copy_dir_all;
use crate::util::process::ProcessBuilder;

/// Result of running one external stage command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stderr: String,
}

impl StageOutput {
    pub fn success() -> Self {
        StageOutput {
            success: true,
            code: Some(0),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        StageOutput {
            success: false,
            code: Some(code),
            stderr: stderr.into(),
        }
    }
}

/// Runs the external command of a stage.
///
/// The process runner is the only production implementation; tests swap
/// in a runner that fakes tool behavior.
pub trait StageRunner: Send + Sync {
    fn run(&self, stage: &Stage, command: &CommandSpec) -> Result<StageOutput>;
}

/// Runs stage commands as subprocesses and waits for them to exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl StageRunner for ProcessRunner {
    fn run(&self, _stage: &Stage, command: &CommandSpec) -> Result<StageOutput> {
        let output = ProcessBuilder::from_spec(command).exec()?;
        Ok(StageOutput {
            success: output.status.success(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// How progress is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFormat {
    /// Log lines through `tracing`.
    #[default]
    Human,
    /// One JSON event per line on stdout.
    Json,
}

impl FromStr for MessageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(MessageFormat::Human),
            "json" => Ok(MessageFormat::Json),
            _ => Err(format!(
                "invalid message format '{}'; expected 'human' or 'json'",
                s
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub kind: StageKind,
    pub fresh: bool,
    pub duration: Duration,
}

/// Outcome of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub binary: PathBuf,
    pub state: PipelineState,
    pub stages: Vec<StageReport>,
    pub bundle: PathBuf,
    pub duration: Duration,
}

impl PipelineReport {
    /// Number of stages skipped as fresh.
    pub fn fresh_count(&self) -> usize {
        self.stages.iter().filter(|s| s.fresh).count()
    }
}

/// Executes pipelines against a configured toolchain.
pub struct PipelineExecutor<'a> {
    setup: &'a ConfiguredToolchain,
    runner: &'a dyn StageRunner,
    format: MessageFormat,
    incremental: bool,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(setup: &'a ConfiguredToolchain, runner: &'a dyn StageRunner) -> Self {
        PipelineExecutor {
            setup,
            runner,
            format: MessageFormat::Human,
            incremental: true,
        }
    }

    pub fn message_format(mut self, format: MessageFormat) -> Self {
        self.format = format;
        self
    }

    /// Skip stages whose fingerprint is unchanged (default: on).
    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    /// Run every stage of `pipeline`.
    ///
    /// On failure the error names the stage; stages after it never start.
    pub fn execute(&self, pipeline: &Pipeline) -> Result<PipelineReport> {
        let start = Instant::now();
        let order = pipeline.execution_order()?;

        self.emit(PackageEvent::PipelineStarted {
            binary: pipeline.binary().to_path_buf(),
            target: self.setup.target.to_string(),
            stages: order.len(),
        });

        let mut run = Run {
            state: PipelineState::Linked,
            stages: Vec::new(),
        };
        let result = self.run_stages(pipeline, &order, &mut run);

        let success = result.is_ok();
        self.emit(PackageEvent::PackageFinished {
            binary: pipeline.binary().to_path_buf(),
            state: run.state,
            success,
            bundle: success.then(|| pipeline.bundle_output()),
            duration_ms: start.elapsed().as_millis() as u64,
        });

        result.with_context(|| format!("failed to package {}", pipeline.binary().display()))?;

        Ok(PipelineReport {
            binary: pipeline.binary().to_path_buf(),
            state: run.state,
            stages: run.stages,
            bundle: pipeline.bundle_output(),
            duration: start.elapsed(),
        })
    }

    fn run_stages(&self, pipeline: &Pipeline, order: &[StageKind], run: &mut Run) -> Result<()> {
        let first = order.first().copied().unwrap_or(StageKind::Link);

        if !pipeline.binary().is_file() {
            run.state = PipelineState::Failed(first);
            return Err(BerthError::PredecessorIncomplete {
                stage: first,
                after: StageKind::Link,
            })
            .with_context(|| format!("linked binary not found: {}", pipeline.binary().display()));
        }

        let mut tree = BuildTree::new(pipeline.root());
        for dir in pipeline.output_dirs() {
            let root = tree.root();
            if let Err(e) = tree.materialize(&dir, root) {
                run.state = PipelineState::Failed(first);
                return Err(e);
            }
        }

        let cache_path = FingerprintCache::path_for(pipeline.root(), pipeline.layout().stem());
        let mut cache = if self.incremental {
            FingerprintCache::load(&cache_path)
        } else {
            FingerprintCache::default()
        };

        let mut completed = vec![StageKind::Link];
        // A stage may only be skipped while everything before it was too.
        let mut upstream_fresh = true;
        let mut result = Ok(());

        for &kind in order {
            let Some(stage) = pipeline.stage(kind) else {
                continue;
            };

            let started = Instant::now();
            match self.run_stage(pipeline, stage, &completed, upstream_fresh, &mut cache) {
                Ok(fresh) => {
                    upstream_fresh = fresh;
                    completed.push(kind);
                    run.state = PipelineState::reached_by(kind);
                    run.stages.push(StageReport {
                        kind,
                        fresh,
                        duration: started.elapsed(),
                    });
                    self.emit(PackageEvent::StageFinished {
                        binary: pipeline.binary().to_path_buf(),
                        stage: kind,
                        outputs: stage.outputs.clone(),
                        fresh,
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Err(e) => {
                    cache.remove(kind);
                    run.state = PipelineState::Failed(kind);
                    tracing::error!("stage `{}` failed for {}", kind, pipeline.binary().display());
                    self.emit(PackageEvent::StageFailed {
                        binary: pipeline.binary().to_path_buf(),
                        stage: kind,
                        message: format!("{:#}", e),
                    });
                    result = Err(e);
                    break;
                }
            }
        }

        if self.incremental {
            if let Err(e) = cache.save(&cache_path) {
                tracing::warn!("could not save fingerprints: {:#}", e);
            }
        }

        result
    }

    /// Run one stage. Returns whether it was skipped as fresh.
    ///
    /// `upstream_fresh` is false once any earlier stage ran in this pass;
    /// the stage then runs regardless of its cached fingerprint.
    fn run_stage(
        &self,
        pipeline: &Pipeline,
        stage: &Stage,
        completed: &[StageKind],
        upstream_fresh: bool,
        cache: &mut FingerprintCache,
    ) -> Result<bool> {
        if !completed.contains(&stage.after) {
            return Err(BerthError::PredecessorIncomplete {
                stage: stage.kind,
                after: stage.after,
            }
            .into());
        }

        let command = stage.command(&self.setup.tools)?;

        let fingerprint = if self.incremental {
            StageFingerprint::for_stage(stage, command.as_ref())?
        } else {
            None
        };
        if let Some(fp) = fingerprint.as_ref().filter(|_| upstream_fresh) {
            if cache.is_fresh(stage, fp) {
                tracing::info!("{:>12} {} (fresh)", "Skipping", stage.kind);
                return Ok(true);
            }
        }

        tracing::info!(
            "{:>12} {} {}",
            verb(stage.kind),
            pipeline.binary().display(),
            stage.kind
        );

        match (&stage.action, command) {
            (StageAction::Run(_), Some(cmd)) => {
                tracing::debug!("running `{}`", cmd.display());
                let output = self.runner.run(stage, &cmd)?;
                if !output.success {
                    return Err(BerthError::StageFailed {
                        stage: stage.kind,
                        command: cmd.display(),
                        code: output.code,
                        stderr: output.stderr,
                    }
                    .into());
                }
            }
            (StageAction::Run(template), None) => {
                return Err(BerthError::InvalidTemplate {
                    template: template.to_string(),
                    reason: "stage produced no command".to_string(),
                }
                .into());
            }
            (StageAction::Assemble { copies, data }, _) => {
                bundle::assemble(copies)?;
                if let Some((from, to)) = data {
                    let n = copy_dir_all(from, to)?;
                    tracing::debug!("copied {} data file(s) into {}", n, to.display());
                }
            }
        }

        // Trust the tool's exit code for content, but every declared output
        // must exist before the next stage may consume it.
        if let Some(missing) = stage.outputs.iter().find(|o| !o.exists()) {
            return Err(BerthError::MissingOutput {
                stage: stage.kind,
                path: missing.clone(),
            }
            .into());
        }

        match fingerprint {
            Some(fp) => cache.insert(stage.kind, fp),
            None => cache.remove(stage.kind),
        }

        Ok(false)
    }

    fn emit(&self, event: PackageEvent) {
        if self.format == MessageFormat::Json {
            println!("{}", event.to_json());
        }
    }
}

struct Run {
    state: PipelineState,
    stages: Vec<StageReport>,
}

fn verb(kind: StageKind) -> &'static str {
    match kind {
        StageKind::Link => "Linking",
        StageKind::Convert => "Converting",
        StageKind::Metadata => "Describing",
        StageKind::Bundle => "Bundling",
        StageKind::Authorize => "Authoring",
    }
}
