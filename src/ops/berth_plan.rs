//! Implementation of `berth plan`.
//!
//! Derives the packaging pipeline for a binary and describes it without
//! running anything.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::builder::pipeline::{Pipeline, StageAction, StageKind};
use crate::builder::toolchain::ConfiguredToolchain;
use crate::util::fs::relative_path;

/// Serializable description of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StagePlan {
    pub stage: StageKind,
    pub after: StageKind,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    /// Expanded command line; absent for in-process stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Serializable description of a whole pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelinePlan {
    pub binary: PathBuf,
    pub target: String,
    pub bundle: PathBuf,
    pub stages: Vec<StagePlan>,
}

/// Derive the pipeline for `binary`, optionally copying `data_dir` into the
/// package.
pub fn derive(
    binary: &Path,
    setup: &ConfiguredToolchain,
    data_dir: Option<&Path>,
) -> Result<Pipeline> {
    Ok(Pipeline::derive_with_data(binary, setup, data_dir)?)
}

/// Describe `pipeline` in execution order.
pub fn describe(pipeline: &Pipeline, setup: &ConfiguredToolchain) -> Result<PipelinePlan> {
    let mut stages = Vec::new();
    for kind in pipeline.execution_order()? {
        let Some(stage) = pipeline.stage(kind) else {
            continue;
        };
        let command = stage.command(&setup.tools)?.map(|c| c.display());
        stages.push(StagePlan {
            stage: kind,
            after: stage.after,
            inputs: stage.inputs.clone(),
            outputs: stage.outputs.clone(),
            command,
        });
    }

    Ok(PipelinePlan {
        binary: pipeline.binary().to_path_buf(),
        target: setup.target.to_string(),
        bundle: pipeline.bundle_output(),
        stages,
    })
}

/// Render a plan for humans, with paths relative to the binary's directory.
pub fn format_plan(plan: &PipelinePlan, pipeline: &Pipeline) -> String {
    let root = pipeline.root();
    let rel = |p: &Path| relative_path(root, p).display().to_string();
    let list = |paths: &[PathBuf]| paths.iter().map(|p| rel(p)).collect::<Vec<_>>().join(", ");

    let mut out = String::new();
    let _ = writeln!(out, "Packaging {} for {}", plan.binary.display(), plan.target);

    for (n, stage) in plan.stages.iter().enumerate() {
        let _ = writeln!(out, "  {}. {} (after {})", n + 1, stage.stage, stage.after);
        let _ = writeln!(out, "       in:  {}", list(&stage.inputs));
        let _ = writeln!(out, "       out: {}", list(&stage.outputs));
        match &stage.command {
            Some(cmd) => {
                let _ = writeln!(out, "       $ {}", cmd);
            }
            None => {
                if let Some(StageAction::Assemble { data: Some((from, _)), .. }) =
                    pipeline.stage(stage.stage).map(|s| &s.action)
                {
                    let _ = writeln!(out, "       data: {}", from.display());
                }
            }
        }
    }

    let _ = writeln!(out, "Package: {}", rel(&plan.bundle));
    out
}
