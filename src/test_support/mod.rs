//! Test utilities for Berth unit tests.
//!
//! [`FakeSdk`] lays out the SDK files the packaging stages read, and
//! [`MockRunner`] stands in for the vendor tools: it writes every declared
//! output of a stage, or fails at a chosen stage.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use tempfile::TempDir;

use crate::builder::executor::{StageOutput, StageRunner};
use crate::builder::pipeline::{Stage, StageKind};
use crate::builder::toolchain::{configure, CommandSpec, ConfiguredToolchain};
use crate::core::{BuildConfiguration, BuildTarget};
use crate::util::config::FlagsConfig;

/// A temporary SDK root with the support files packaging needs.
pub struct FakeSdk {
    dir: TempDir,
}

impl FakeSdk {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let sdk = FakeSdk { dir };
        let setup = sdk.setup();
        for file in [
            &setup.support.descriptor,
            &setup.support.metadata,
            &setup.support.runtime_loader,
            &setup.support.sdk_object,
        ] {
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, file.file_name().unwrap().to_string_lossy().as_bytes()).unwrap();
        }
        sdk
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Toolchain configured for `arm64-nx64` debug against this SDK.
    pub fn setup(&self) -> ConfiguredToolchain {
        let target = BuildTarget::parse("arm64-nx64", BuildConfiguration::Debug).unwrap();
        configure(&target, Some(self.root()), &FlagsConfig::default()).unwrap()
    }
}

/// Write a fake linked binary at `dir/<name>`.
pub fn linked_binary(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::create_dir_all(dir).unwrap();
    fs::write(&path, b"\x7fELF").unwrap();
    path
}

/// Stand-in for the vendor tools.
#[derive(Default)]
pub struct MockRunner {
    fail_at: Option<StageKind>,
    silent_at: Option<StageKind>,
    calls: Mutex<Vec<(StageKind, CommandSpec)>>,
}

impl MockRunner {
    pub fn new() -> Self {
        MockRunner::default()
    }

    /// Exit non-zero when running `kind`.
    pub fn failing_at(kind: StageKind) -> Self {
        MockRunner {
            fail_at: Some(kind),
            ..Default::default()
        }
    }

    /// Exit zero at `kind` without writing its outputs.
    pub fn silent_at(kind: StageKind) -> Self {
        MockRunner {
            silent_at: Some(kind),
            ..Default::default()
        }
    }

    /// Stages run so far, in order.
    pub fn ran(&self) -> Vec<StageKind> {
        self.calls.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }

    pub fn command_for(&self, kind: StageKind) -> Option<CommandSpec> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, c)| c.clone())
    }
}

impl StageRunner for MockRunner {
    fn run(&self, stage: &Stage, command: &CommandSpec) -> Result<StageOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((stage.kind, command.clone()));

        if self.fail_at == Some(stage.kind) {
            return Ok(StageOutput::failure(1, format!("{} exploded", stage.kind)));
        }
        if self.silent_at != Some(stage.kind) {
            for output in &stage.outputs {
                fs::write(output, stage.kind.as_str())?;
            }
        }
        Ok(StageOutput::success())
    }
}
