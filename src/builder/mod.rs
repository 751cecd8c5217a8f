//! Post-link packaging.
//!
//! This module implements the platform toolchains, the per-binary stage
//! pipeline, and its execution.

pub mod bundle;
pub mod events;
pub mod executor;
pub mod fingerprint;
pub mod pipeline;
pub mod template;
pub mod toolchain;
pub mod tree;

pub use bundle::{BundleCopy, BundleLayout, BundleRole};
pub use events::PackageEvent;
pub use executor::{MessageFormat, PipelineExecutor, PipelineReport, ProcessRunner, StageRunner};
pub use pipeline::{Pipeline, PipelineState, Stage, StageAction, StageKind};
pub use template::{CommandTemplate, TemplateVars};
pub use toolchain::{
    configure, resolve_sdk_root, CommandSpec, ConfiguredToolchain, PlatformToolchain, ToolRole,
    ToolchainConfig, SDK_ROOT_ENV,
};
pub use tree::BuildTree;
