//! Command implementations

use std::path::PathBuf;

use anyhow::Result;

use berth::builder::ConfiguredToolchain;
use berth::ops::{self, SetupOptions};
use berth::util::{Config, GlobalContext};

use crate::cli::TargetArgs;

pub mod completions;
pub mod flags;
pub mod package;
pub mod plan;
pub mod run;
pub mod toolchain;

/// Options accepted by every command.
pub struct GlobalArgs {
    pub verbose: bool,
    pub sdk_root: Option<PathBuf>,
}

/// Context, merged config, and the toolchain for the selected target.
pub struct Session {
    pub ctx: GlobalContext,
    pub config: Config,
    pub setup: ConfiguredToolchain,
}

impl Session {
    pub fn open(global: &GlobalArgs, target: &TargetArgs) -> Result<Self> {
        let mut ctx = GlobalContext::new()?;
        ctx.set_verbose(global.verbose);
        let config = ctx.load_config();

        let opts = SetupOptions {
            target: target.target.clone(),
            release: target.release,
            sdk_root: global.sdk_root.as_ref().map(|p| ctx.resolve(p)),
        };
        let setup = ops::setup(&config, &opts)?;

        Ok(Session { ctx, config, setup })
    }

    /// Data directory from the command line, else config.
    pub fn data_dir(&self, arg: Option<&PathBuf>) -> Option<PathBuf> {
        arg.map(|p| self.ctx.resolve(p))
            .or_else(|| self.config.package.data_dir.clone())
    }
}
