//! Typed errors for configuration, subprocess, and filesystem failures.
//!
//! Operations return `anyhow::Result` and attach these as the root cause, so
//! callers (and tests) can `downcast_ref::<BerthError>()` to tell the three
//! families apart. Nothing in Berth retries; every error halts the pipeline
//! that raised it.

use std::path::PathBuf;

use thiserror::Error;

use crate::builder::pipeline::StageKind;

#[derive(Debug, Error)]
pub enum BerthError {
    // Configuration errors: raised before any stage runs.
    #[error("environment variable `{var}` is not set; point it at the SDK root")]
    MissingSdkRoot { var: &'static str },

    #[error("SDK root does not exist: {}", path.display())]
    SdkRootNotFound { path: PathBuf },

    #[error("unsupported platform `{platform}`")]
    UnsupportedPlatform { platform: String },

    #[error("invalid target `{value}`: {reason}")]
    InvalidTarget { value: String, reason: String },

    #[error("command template `{template}` references unknown variable `${{{name}}}`")]
    UnknownTemplateVar { template: String, name: String },

    #[error("malformed command template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("invalid pipeline: {reason}")]
    InvalidPipeline { reason: String },

    #[error("cannot derive artifact names from `{}`", path.display())]
    InvalidBinary { path: PathBuf },

    #[error("no `{role}` tool configured")]
    MissingTool { role: &'static str },

    // Subprocess errors: fatal to one binary's pipeline only.
    #[error("stage `{stage}` failed with exit code {code:?}: `{command}`\n{stderr}")]
    StageFailed {
        stage: StageKind,
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("stage `{stage}` did not produce {}", path.display())]
    MissingOutput { stage: StageKind, path: PathBuf },

    #[error("stage `{stage}` cannot start: `{after}` has not completed")]
    PredecessorIncomplete { stage: StageKind, after: StageKind },

    // Filesystem errors.
    #[error("failed to create directory {}", path.display())]
    CreateDir { path: PathBuf },

    #[error("failed to copy {} to {}", from.display(), to.display())]
    Copy { from: PathBuf, to: PathBuf },

    #[error("bundle input is missing: {}", path.display())]
    MissingBundleInput { path: PathBuf },

    #[error("output path `{path}` leaves the build tree")]
    EscapingPath { path: String },
}

impl BerthError {
    /// Whether this error was raised while resolving configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BerthError::MissingSdkRoot { .. }
                | BerthError::SdkRootNotFound { .. }
                | BerthError::UnsupportedPlatform { .. }
                | BerthError::InvalidTarget { .. }
                | BerthError::UnknownTemplateVar { .. }
                | BerthError::InvalidTemplate { .. }
                | BerthError::InvalidPipeline { .. }
                | BerthError::InvalidBinary { .. }
                | BerthError::MissingTool { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sdk_root_names_variable() {
        let err = BerthError::MissingSdkRoot {
            var: "NINTENDO_SDK_ROOT",
        };
        assert!(err.to_string().contains("NINTENDO_SDK_ROOT"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unknown_template_var_message() {
        let err = BerthError::UnknownTemplateVar {
            template: "${TOOL} ${SRC}".to_string(),
            name: "TOOL".to_string(),
        };
        assert!(err.to_string().contains("`${TOOL}`"));
    }

    #[test]
    fn test_stage_failure_is_not_configuration() {
        let err = BerthError::StageFailed {
            stage: StageKind::Metadata,
            command: "MakeMeta.exe".to_string(),
            code: Some(2),
            stderr: String::new(),
        };
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("meta"));
    }
}
