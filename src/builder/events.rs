//! Packaging event types for JSON output.
//!
//! Emitted one object per line on stdout with `--message-format json`.
//!
//! # Event Types
//!
//! - `pipeline-started`: a binary entered its pipeline
//! - `stage-finished`: a stage completed or was skipped as fresh
//! - `stage-failed`: a stage failed; the pipeline stops
//! - `package-finished`: a pipeline reached a terminal state
//!
//! New fields may be added; existing fields are not removed or renamed.

use std::path::PathBuf;

use serde::Serialize;

use crate::builder::pipeline::{PipelineState, StageKind};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason")]
pub enum PackageEvent {
    #[serde(rename = "pipeline-started")]
    PipelineStarted {
        binary: PathBuf,
        /// Target the toolchain was configured for (e.g. `arm64-nx64 (debug)`)
        target: String,
        stages: usize,
    },

    #[serde(rename = "stage-finished")]
    StageFinished {
        binary: PathBuf,
        stage: StageKind,
        outputs: Vec<PathBuf>,
        /// Skipped because nothing changed since the last run
        fresh: bool,
        duration_ms: u64,
    },

    #[serde(rename = "stage-failed")]
    StageFailed {
        binary: PathBuf,
        stage: StageKind,
        message: String,
    },

    #[serde(rename = "package-finished")]
    PackageFinished {
        binary: PathBuf,
        state: PipelineState,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        bundle: Option<PathBuf>,
        duration_ms: u64,
    },
}

impl PackageEvent {
    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_finished_serialization() {
        let event = PackageEvent::StageFinished {
            binary: PathBuf::from("out/game.nss"),
            stage: StageKind::Metadata,
            outputs: vec![PathBuf::from("out/game.npdm")],
            fresh: false,
            duration_ms: 12,
        };
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"stage-finished\""));
        assert!(json.contains("\"stage\":\"meta\""));
        assert!(json.contains("game.npdm"));
        assert!(json.contains("\"fresh\":false"));
    }

    #[test]
    fn test_package_finished_failed_state() {
        let event = PackageEvent::PackageFinished {
            binary: PathBuf::from("out/game.nss"),
            state: PipelineState::Failed(StageKind::Bundle),
            success: false,
            bundle: None,
            duration_ms: 3,
        };
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"package-finished\""));
        assert!(json.contains("\"failed\":\"bundle\""));
        assert!(!json.contains("\"bundle\":null"));
    }
}
