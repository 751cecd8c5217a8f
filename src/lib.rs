//! Berth - post-link packaging for console SDK cross builds
//!
//! This crate resolves a platform SDK toolchain and its flags, and turns
//! linked binaries into installable packages by running the vendor's
//! convert, metadata, bundle and authoring steps.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Test utilities and mocks for Berth unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a fake SDK layout and a stage runner that
/// stands in for the vendor tools.
#[cfg(test)]
pub mod test_support;

pub use builder::{ConfiguredToolchain, Pipeline, PipelineExecutor};
pub use crate::core::{BuildConfiguration, BuildTarget, FlagSet, Platform};
pub use util::context::GlobalContext;
pub use util::errors::BerthError;
