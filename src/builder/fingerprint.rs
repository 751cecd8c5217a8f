//! Stage fingerprinting for incremental packaging.
//!
//! A fingerprint captures the expanded command line and the content hash of
//! every input. A stage whose fingerprint is unchanged and whose outputs all
//! exist is skipped on the next run, provided every stage before it was
//! skipped as well.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::pipeline::{Stage, StageAction, StageKind};
use crate::builder::toolchain::CommandSpec;
use crate::util::fs::write_string;
use crate::util::hash::{sha256_file, Fingerprint};

/// Directory (under the pipeline root) holding fingerprint caches.
pub const FINGERPRINT_DIR: &str = ".berth";

/// Fingerprint of one stage execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFingerprint {
    /// Hash of the command line (or copy list for in-process stages)
    pub command: String,
    /// Content hash per input; `None` when the input did not exist
    pub inputs: BTreeMap<PathBuf, Option<String>>,
}

impl StageFingerprint {
    /// Fingerprint a stage about to run with `command`.
    ///
    /// Returns `None` for stages whose effects cannot be captured, namely a
    /// bundle stage that mirrors an app data directory.
    pub fn for_stage(stage: &Stage, command: Option<&CommandSpec>) -> Result<Option<Self>> {
        let mut fp = Fingerprint::new();
        fp.update_str(stage.kind.as_str());

        match (&stage.action, command) {
            (StageAction::Assemble { data: Some(_), .. }, _) => return Ok(None),
            (StageAction::Assemble { copies, .. }, _) => {
                for copy in copies {
                    fp.update_path(&copy.from).update_path(&copy.to);
                }
            }
            (StageAction::Run(_), Some(cmd)) => {
                fp.update_path(&cmd.program)
                    .update_strs(cmd.args.iter().map(String::as_str));
            }
            (StageAction::Run(template), None) => {
                fp.update_str(template.as_str());
            }
        }

        let mut inputs = BTreeMap::new();
        for input in &stage.inputs {
            let hash = if input.is_file() {
                Some(sha256_file(input)?)
            } else {
                None
            };
            inputs.insert(input.clone(), hash);
        }

        Ok(Some(StageFingerprint {
            command: fp.finish_short(),
            inputs,
        }))
    }
}

/// Fingerprints of one binary's stages, persisted as JSON.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FingerprintCache {
    stages: BTreeMap<String, StageFingerprint>,
}

impl FingerprintCache {
    /// Cache file for the binary with `stem` under `root`.
    pub fn path_for(root: &Path, stem: &str) -> PathBuf {
        root.join(FINGERPRINT_DIR)
            .join(format!("{}.fingerprint.json", stem))
    }

    /// Load a cache. A missing or unreadable cache is treated as empty.
    pub fn load(path: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return FingerprintCache::default();
        };
        serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!("ignoring corrupt fingerprint cache {}: {}", path.display(), e);
            FingerprintCache::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("failed to serialize fingerprints")?;
        write_string(path, &json)
    }

    pub fn get(&self, kind: StageKind) -> Option<&StageFingerprint> {
        self.stages.get(kind.as_str())
    }

    pub fn insert(&mut self, kind: StageKind, fingerprint: StageFingerprint) {
        self.stages.insert(kind.as_str().to_string(), fingerprint);
    }

    /// Drop the entry for `kind` (after a failure, or when it cannot be cached).
    pub fn remove(&mut self, kind: StageKind) {
        self.stages.remove(kind.as_str());
    }

    /// Whether `stage` can be skipped: same fingerprint as last time and
    /// every declared output still present.
    pub fn is_fresh(&self, stage: &Stage, fingerprint: &StageFingerprint) -> bool {
        self.get(stage.kind) == Some(fingerprint) && stage.outputs.iter().all(|o| o.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::template::{CommandTemplate, TemplateVars};
    use std::fs;
    use tempfile::TempDir;

    fn convert_stage(root: &Path) -> Stage {
        Stage {
            kind: StageKind::Convert,
            inputs: vec![root.join("game.nss")],
            outputs: vec![root.join("game.nso")],
            action: StageAction::Run(CommandTemplate::parse("${MAKENSO} ${SRC} ${TGT}").unwrap()),
            after: StageKind::Link,
            vars: TemplateVars::new(),
        }
    }

    #[test]
    fn test_fresh_after_identical_run() {
        let tmp = TempDir::new().unwrap();
        let stage = convert_stage(tmp.path());
        fs::write(&stage.inputs[0], "elf").unwrap();
        fs::write(&stage.outputs[0], "nso").unwrap();
        let cmd = CommandSpec::new("MakeNso.exe").arg("game.nss").arg("game.nso");

        let fp = StageFingerprint::for_stage(&stage, Some(&cmd)).unwrap().unwrap();
        let mut cache = FingerprintCache::default();
        assert!(!cache.is_fresh(&stage, &fp));

        cache.insert(stage.kind, fp.clone());
        assert!(cache.is_fresh(&stage, &fp));

        // Changing the input invalidates it.
        fs::write(&stage.inputs[0], "elf2").unwrap();
        let changed = StageFingerprint::for_stage(&stage, Some(&cmd)).unwrap().unwrap();
        assert!(!cache.is_fresh(&stage, &changed));

        // So does a missing output.
        fs::remove_file(&stage.outputs[0]).unwrap();
        assert!(!cache.is_fresh(&stage, &fp));
    }

    #[test]
    fn test_command_change_invalidates() {
        let tmp = TempDir::new().unwrap();
        let stage = convert_stage(tmp.path());
        fs::write(&stage.inputs[0], "elf").unwrap();

        let a = StageFingerprint::for_stage(&stage, Some(&CommandSpec::new("a"))).unwrap();
        let b = StageFingerprint::for_stage(&stage, Some(&CommandSpec::new("b"))).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_bundle_with_data_is_never_cached() {
        let tmp = TempDir::new().unwrap();
        let stage = Stage {
            kind: StageKind::Bundle,
            inputs: vec![],
            outputs: vec![],
            action: StageAction::Assemble {
                copies: vec![],
                data: Some((tmp.path().join("assets"), tmp.path().join("game.data"))),
            },
            after: StageKind::Metadata,
            vars: TemplateVars::new(),
        };
        assert!(StageFingerprint::for_stage(&stage, None).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let stage = convert_stage(tmp.path());
        let fp = StageFingerprint::for_stage(&stage, None).unwrap().unwrap();

        let path = FingerprintCache::path_for(tmp.path(), "game");
        let mut cache = FingerprintCache::default();
        cache.insert(StageKind::Convert, fp.clone());
        cache.save(&path).unwrap();

        let loaded = FingerprintCache::load(&path);
        assert_eq!(loaded.get(StageKind::Convert), Some(&fp));
        assert!(path.ends_with(".berth/game.fingerprint.json"));
    }

    #[test]
    fn test_corrupt_cache_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(FingerprintCache::load(&path).get(StageKind::Convert).is_none());
    }
}
