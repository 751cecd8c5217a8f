//! Core data types: build targets and flag collections.

pub mod flags;
pub mod target;

pub use flags::{FlagKind, FlagSet, UniqueList};
pub use target::{BuildConfiguration, BuildTarget, Platform, TargetKind};
