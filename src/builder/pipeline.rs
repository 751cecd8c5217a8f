//! Post-link packaging pipeline.
//!
//! For every linked binary Berth derives a fixed, linear chain of stages:
//!
//! 1. `convert`: linked output to the native executable format
//! 2. `meta`: application metadata from the SDK descriptor templates
//! 3. `bundle`: copy executable, metadata and SDK support files into
//!    the code directory
//! 4. `authorize`: seal the bundle with the authoring tool
//!
//! Each stage is a plain record naming its inputs, outputs, action and the
//! stage it must run after. Deriving a pipeline touches nothing on disk;
//! the executor materializes output directories and runs the stages.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;

use crate::builder::bundle::{BundleCopy, BundleLayout, BundleRole};
use crate::builder::template::{CommandTemplate, TemplateVars};
use crate::builder::toolchain::{CommandSpec, ConfiguredToolchain, ToolchainConfig};
use crate::util::errors::BerthError;

const CONVERT_TEMPLATE: &str = "${MAKENSO} ${SRC} ${TGT}";

const META_TEMPLATE: &str = "${MAKEMETA} --desc ${DESC} --meta ${META} -o ${TGT} \
    -d DefaultIs64BitInstruction=True -d DefaultProcessAddressSpace=AddressSpace64Bit";

const AUTHORIZE_TEMPLATE: &str = "${AUTHORINGTOOL} createnspd -o ${NSPD_DIR} --meta ${META} \
    --type Application --program ${CODE_DIR} ${DATA_DIR} --utf8";

/// Kind of a pipeline stage. `Link` is the external stage that produced
/// the binary; every pipeline starts after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Link,
    Convert,
    #[serde(rename = "meta")]
    Metadata,
    Bundle,
    Authorize,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Link => "link",
            StageKind::Convert => "convert",
            StageKind::Metadata => "meta",
            StageKind::Bundle => "bundle",
            StageKind::Authorize => "authorize",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage does.
#[derive(Debug, Clone)]
pub enum StageAction {
    /// Run an external tool.
    Run(CommandTemplate),
    /// Copy files into the bundle, then optionally mirror an app data
    /// directory (`from`, `to`).
    Assemble {
        copies: Vec<BundleCopy>,
        data: Option<(PathBuf, PathBuf)>,
    },
}

/// One step of a pipeline.
#[derive(Debug, Clone)]
pub struct Stage {
    pub kind: StageKind,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    pub action: StageAction,
    /// Stage that must complete before this one starts.
    pub after: StageKind,
    /// Stage-specific template variables (on top of tool paths, `SRC`, `TGT`).
    pub vars: TemplateVars,
}

impl Stage {
    pub fn template(&self) -> Option<&CommandTemplate> {
        match &self.action {
            StageAction::Run(template) => Some(template),
            StageAction::Assemble { .. } => None,
        }
    }

    /// Expand the stage's command. `None` for in-process stages.
    pub fn command(&self, tools: &ToolchainConfig) -> Result<Option<CommandSpec>, BerthError> {
        let Some(template) = self.template() else {
            return Ok(None);
        };

        let mut vars = tools.template_vars();
        vars.merge(&self.vars);
        vars.set_paths("SRC", &self.inputs);
        vars.set_paths("TGT", &self.outputs);

        template.to_command(&vars).map(Some)
    }
}

/// Progress of one binary through its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    Linked,
    Converted,
    MetadataGenerated,
    BundleAssembled,
    Authorized,
    Failed(StageKind),
}

impl PipelineState {
    /// State reached once `kind` completes.
    pub fn reached_by(kind: StageKind) -> Self {
        match kind {
            StageKind::Link => PipelineState::Linked,
            StageKind::Convert => PipelineState::Converted,
            StageKind::Metadata => PipelineState::MetadataGenerated,
            StageKind::Bundle => PipelineState::BundleAssembled,
            StageKind::Authorize => PipelineState::Authorized,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Authorized | PipelineState::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Linked => f.write_str("linked"),
            PipelineState::Converted => f.write_str("converted"),
            PipelineState::MetadataGenerated => f.write_str("metadata generated"),
            PipelineState::BundleAssembled => f.write_str("bundle assembled"),
            PipelineState::Authorized => f.write_str("authorized"),
            PipelineState::Failed(stage) => write!(f, "failed at `{}`", stage),
        }
    }
}

/// The derived stage chain for one linked binary.
#[derive(Debug, Clone)]
pub struct Pipeline {
    root: PathBuf,
    binary: PathBuf,
    layout: BundleLayout,
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Derive the packaging pipeline for `binary`.
    ///
    /// Output names come from the binary's stem: `game.nss` yields
    /// `game.nso`, `game.npdm`, `game.code/`, `game.data/` and the package
    /// directory named by the platform's bundle pattern.
    pub fn derive(binary: &Path, setup: &ConfiguredToolchain) -> Result<Self, BerthError> {
        Self::derive_with_data(binary, setup, None)
    }

    /// Like [`Pipeline::derive`], also copying `data_source` into the
    /// package's data directory during the bundle stage.
    pub fn derive_with_data(
        binary: &Path,
        setup: &ConfiguredToolchain,
        data_source: Option<&Path>,
    ) -> Result<Self, BerthError> {
        let stem = binary
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BerthError::InvalidBinary {
                path: binary.to_path_buf(),
            })?;

        let root = match binary.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let layout = BundleLayout::new(&stem, setup.patterns.bundle_name(&stem));
        let at = |role| layout.resolve(&root, role);

        let converted = binary.with_extension("nso");
        let metadata = binary.with_extension("npdm");
        let support = &setup.support;

        let mut meta_vars = TemplateVars::new();
        meta_vars
            .set("DESC", support.descriptor.display().to_string())
            .set("META", support.metadata.display().to_string());

        let copies = vec![
            BundleCopy::new(BundleRole::Main, &converted, at(BundleRole::Main)),
            BundleCopy::new(BundleRole::Metadata, &metadata, at(BundleRole::Metadata)),
            BundleCopy::new(
                BundleRole::RuntimeLoader,
                &support.runtime_loader,
                at(BundleRole::RuntimeLoader),
            ),
            BundleCopy::new(
                BundleRole::SdkObject,
                &support.sdk_object,
                at(BundleRole::SdkObject),
            ),
        ];

        // The authoring tool reads the whole code directory and the nmeta.
        let mut authorize_inputs: Vec<PathBuf> = copies.iter().map(|c| c.to.clone()).collect();
        authorize_inputs.push(support.metadata.clone());

        let mut authorize_vars = TemplateVars::new();
        authorize_vars
            .set("META", support.metadata.display().to_string())
            .set(
                "NSPD_DIR",
                root.join(layout.package_dir()).display().to_string(),
            )
            .set("CODE_DIR", root.join(layout.code_dir()).display().to_string())
            .set("DATA_DIR", at(BundleRole::Data).display().to_string());

        let stages = vec![
            Stage {
                kind: StageKind::Convert,
                inputs: vec![binary.to_path_buf()],
                outputs: vec![converted.clone()],
                action: StageAction::Run(CommandTemplate::parse(CONVERT_TEMPLATE)?),
                after: StageKind::Link,
                vars: TemplateVars::new(),
            },
            Stage {
                kind: StageKind::Metadata,
                inputs: vec![
                    converted.clone(),
                    support.descriptor.clone(),
                    support.metadata.clone(),
                ],
                outputs: vec![metadata.clone()],
                action: StageAction::Run(CommandTemplate::parse(META_TEMPLATE)?),
                after: StageKind::Convert,
                vars: meta_vars,
            },
            Stage {
                kind: StageKind::Bundle,
                inputs: copies.iter().map(|c| c.from.clone()).collect(),
                outputs: copies.iter().map(|c| c.to.clone()).collect(),
                action: StageAction::Assemble {
                    copies,
                    data: data_source.map(|src| (src.to_path_buf(), at(BundleRole::Data))),
                },
                after: StageKind::Metadata,
                vars: TemplateVars::new(),
            },
            Stage {
                kind: StageKind::Authorize,
                inputs: authorize_inputs,
                outputs: vec![at(BundleRole::Control)],
                action: StageAction::Run(CommandTemplate::parse(AUTHORIZE_TEMPLATE)?),
                after: StageKind::Bundle,
                vars: authorize_vars,
            },
        ];

        Ok(Pipeline {
            root,
            binary: binary.to_path_buf(),
            layout,
            stages,
        })
    }

    /// Build a pipeline from explicit stages. The chain is validated.
    pub fn from_stages(
        binary: impl Into<PathBuf>,
        layout: BundleLayout,
        stages: Vec<Stage>,
    ) -> Result<Self, BerthError> {
        let binary = binary.into();
        let root = match binary.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let pipeline = Pipeline {
            root,
            binary,
            layout,
            stages,
        };
        pipeline.execution_order()?;
        Ok(pipeline)
    }

    /// Directory the binary lives in; all outputs are placed under it.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn layout(&self) -> &BundleLayout {
        &self.layout
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, kind: StageKind) -> Option<&Stage> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    /// The final package directory.
    pub fn bundle_output(&self) -> PathBuf {
        self.root.join(self.layout.package_dir())
    }

    /// Directories (relative to [`Pipeline::root`]) that must exist before
    /// any stage writes into them.
    pub fn output_dirs(&self) -> Vec<String> {
        vec![
            self.layout.package_dir().to_string(),
            self.layout.control_dir(),
            self.layout.code_dir(),
            self.layout.data_dir(),
        ]
    }

    /// Order stages by their `after` constraints.
    ///
    /// The constraints must form a single chain starting at `link`: no
    /// duplicate stages, no unknown predecessors, no cycles, no branching.
    pub fn execution_order(&self) -> Result<Vec<StageKind>, BerthError> {
        let invalid = |reason: String| BerthError::InvalidPipeline { reason };

        let mut graph: DiGraph<StageKind, ()> = DiGraph::new();
        let link = graph.add_node(StageKind::Link);
        let mut nodes: Vec<(StageKind, NodeIndex)> = vec![(StageKind::Link, link)];

        for stage in &self.stages {
            if nodes.iter().any(|(kind, _)| *kind == stage.kind) {
                return Err(invalid(format!("stage `{}` is declared twice", stage.kind)));
            }
            nodes.push((stage.kind, graph.add_node(stage.kind)));
        }

        let index_of = |kind: StageKind| nodes.iter().find(|(k, _)| *k == kind).map(|(_, i)| *i);

        for stage in &self.stages {
            let from = index_of(stage.after).ok_or_else(|| {
                invalid(format!(
                    "stage `{}` runs after unknown stage `{}`",
                    stage.kind, stage.after
                ))
            })?;
            let to = index_of(stage.kind).ok_or_else(|| invalid("lost stage".to_string()))?;
            graph.add_edge(from, to, ());
        }

        for (kind, index) in &nodes {
            if graph.neighbors_directed(*index, Direction::Outgoing).count() > 1 {
                return Err(invalid(format!("more than one stage runs after `{}`", kind)));
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            invalid(format!(
                "ordering cycle through `{}`",
                graph[cycle.node_id()]
            ))
        })?;

        Ok(order
            .into_iter()
            .map(|i| graph[i])
            .filter(|kind| *kind != StageKind::Link)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::configure;
    use crate::core::{BuildConfiguration, BuildTarget};
    use crate::util::config::FlagsConfig;
    use tempfile::TempDir;

    fn setup(sdk: &Path) -> ConfiguredToolchain {
        let target = BuildTarget::parse("arm64-nx64", BuildConfiguration::Debug).unwrap();
        configure(&target, Some(sdk), &FlagsConfig::default()).unwrap()
    }

    fn names(paths: &[PathBuf], root: &Path) -> Vec<String> {
        paths
            .iter()
            .map(|p| {
                p.strip_prefix(root)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_derive_names_outputs_from_stem() {
        let sdk = TempDir::new().unwrap();
        let out = Path::new("build/arm64-nx64");
        let pipeline = Pipeline::derive(&out.join("game.nss"), &setup(sdk.path())).unwrap();

        let kinds: Vec<_> = pipeline.stages().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Convert,
                StageKind::Metadata,
                StageKind::Bundle,
                StageKind::Authorize
            ]
        );

        let convert = pipeline.stage(StageKind::Convert).unwrap();
        assert_eq!(names(&convert.inputs, out), vec!["game.nss"]);
        assert_eq!(names(&convert.outputs, out), vec!["game.nso"]);

        let meta = pipeline.stage(StageKind::Metadata).unwrap();
        assert_eq!(names(&meta.outputs, out), vec!["game.npdm"]);
        assert_eq!(meta.inputs.len(), 3);
        assert!(meta.inputs[1].ends_with("Resources/SpecFiles/Application.desc"));
        assert!(meta.inputs[2].ends_with("Resources/SpecFiles/Application.aarch64.lp64.nmeta"));

        let bundle = pipeline.stage(StageKind::Bundle).unwrap();
        assert_eq!(
            names(&bundle.outputs, out),
            vec![
                "game.code/main",
                "game.code/main.npdm",
                "game.code/rtld",
                "game.code/sdk"
            ]
        );

        let authorize = pipeline.stage(StageKind::Authorize).unwrap();
        assert_eq!(&names(&authorize.inputs, out)[..4], &names(&bundle.outputs, out)[..]);
        assert!(authorize.inputs[4].ends_with("Application.aarch64.lp64.nmeta"));
        assert_eq!(
            names(&authorize.outputs, out),
            vec!["game.nspd/control0.ncd/data/control.nacp"]
        );

        assert_eq!(pipeline.bundle_output(), out.join("game.nspd"));
        assert_eq!(
            pipeline.output_dirs(),
            vec![
                "game.nspd",
                "game.nspd/control0.ncd/data",
                "game.code",
                "game.data"
            ]
        );
    }

    #[test]
    fn test_stage_commands() {
        let sdk = TempDir::new().unwrap();
        let setup = setup(sdk.path());
        let pipeline = Pipeline::derive(Path::new("out/game.nss"), &setup).unwrap();

        let convert = pipeline.stage(StageKind::Convert).unwrap();
        let cmd = convert.command(&setup.tools).unwrap().unwrap();
        assert!(cmd.program.ends_with("MakeNso/MakeNso.exe"));
        assert_eq!(cmd.args, vec!["out/game.nss", "out/game.nso"]);

        let meta = pipeline.stage(StageKind::Metadata).unwrap();
        let cmd = meta.command(&setup.tools).unwrap().unwrap();
        assert_eq!(cmd.args[0], "--desc");
        assert!(cmd.args[1].ends_with("Resources/SpecFiles/Application.desc"));
        assert!(cmd.args.contains(&"out/game.npdm".to_string()));
        assert!(cmd
            .args
            .contains(&"DefaultProcessAddressSpace=AddressSpace64Bit".to_string()));

        let authorize = pipeline.stage(StageKind::Authorize).unwrap();
        let cmd = authorize.command(&setup.tools).unwrap().unwrap();
        assert_eq!(cmd.args[0], "createnspd");
        assert!(cmd.args.contains(&"out/game.code".to_string()));
        assert!(cmd.args.contains(&"out/game.data".to_string()));
        assert_eq!(cmd.args.last().map(String::as_str), Some("--utf8"));

        let bundle = pipeline.stage(StageKind::Bundle).unwrap();
        assert!(bundle.command(&setup.tools).unwrap().is_none());
    }

    #[test]
    fn test_derive_rejects_binary_without_stem() {
        let sdk = TempDir::new().unwrap();
        let err = Pipeline::derive(Path::new(""), &setup(sdk.path())).unwrap_err();
        assert!(matches!(err, BerthError::InvalidBinary { .. }));
    }

    #[test]
    fn test_bare_file_name_uses_current_dir() {
        let sdk = TempDir::new().unwrap();
        let pipeline = Pipeline::derive(Path::new("game.nss"), &setup(sdk.path())).unwrap();
        assert_eq!(pipeline.root(), Path::new("."));
    }

    #[test]
    fn test_execution_order_is_linear() {
        let sdk = TempDir::new().unwrap();
        let pipeline = Pipeline::derive(Path::new("out/game.nss"), &setup(sdk.path())).unwrap();
        assert_eq!(
            pipeline.execution_order().unwrap(),
            vec![
                StageKind::Convert,
                StageKind::Metadata,
                StageKind::Bundle,
                StageKind::Authorize
            ]
        );
    }

    fn stage(kind: StageKind, after: StageKind) -> Stage {
        Stage {
            kind,
            inputs: vec![],
            outputs: vec![],
            action: StageAction::Run(CommandTemplate::parse("true").unwrap()),
            after,
            vars: TemplateVars::new(),
        }
    }

    #[test]
    fn test_from_stages_orders_by_constraint() {
        let layout = BundleLayout::new("game", "game.nspd");
        let pipeline = Pipeline::from_stages(
            "out/game.nss",
            layout,
            vec![
                stage(StageKind::Metadata, StageKind::Convert),
                stage(StageKind::Convert, StageKind::Link),
            ],
        )
        .unwrap();
        assert_eq!(
            pipeline.execution_order().unwrap(),
            vec![StageKind::Convert, StageKind::Metadata]
        );
    }

    #[test]
    fn test_rejects_branching() {
        let layout = BundleLayout::new("game", "game.nspd");
        let err = Pipeline::from_stages(
            "out/game.nss",
            layout,
            vec![
                stage(StageKind::Convert, StageKind::Link),
                stage(StageKind::Metadata, StageKind::Convert),
                stage(StageKind::Bundle, StageKind::Convert),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, BerthError::InvalidPipeline { .. }));
    }

    #[test]
    fn test_rejects_cycles_and_unknown_predecessors() {
        let layout = BundleLayout::new("game", "game.nspd");
        let cycle = Pipeline::from_stages(
            "out/game.nss",
            layout.clone(),
            vec![
                stage(StageKind::Convert, StageKind::Metadata),
                stage(StageKind::Metadata, StageKind::Convert),
            ],
        );
        assert!(matches!(cycle, Err(BerthError::InvalidPipeline { .. })));

        let unknown = Pipeline::from_stages(
            "out/game.nss",
            layout.clone(),
            vec![stage(StageKind::Bundle, StageKind::Metadata)],
        );
        assert!(matches!(unknown, Err(BerthError::InvalidPipeline { .. })));

        let duplicate = Pipeline::from_stages(
            "out/game.nss",
            layout,
            vec![
                stage(StageKind::Convert, StageKind::Link),
                stage(StageKind::Convert, StageKind::Link),
            ],
        );
        assert!(matches!(duplicate, Err(BerthError::InvalidPipeline { .. })));
    }

    #[test]
    fn test_state_transitions() {
        assert_eq!(
            PipelineState::reached_by(StageKind::Metadata),
            PipelineState::MetadataGenerated
        );
        assert!(PipelineState::Authorized.is_terminal());
        assert!(PipelineState::Failed(StageKind::Bundle).is_terminal());
        assert!(!PipelineState::BundleAssembled.is_terminal());
    }
}
