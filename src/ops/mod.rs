//! High-level operations.
//!
//! This module contains the implementation of Berth commands.

pub mod berth_package;
pub mod berth_plan;
pub mod berth_run;
pub mod berth_setup;

pub use berth_package::{package, package_with, PackageOptions, PackageOutcome, PackageSummary};
pub use berth_plan::{derive, describe, format_plan, PipelinePlan, StagePlan};
pub use berth_run::{launch_command, run};
pub use berth_setup::{binary_for, select_target, setup, SetupOptions};
