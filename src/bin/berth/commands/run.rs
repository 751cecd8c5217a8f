//! `berth run` command

use anyhow::Result;

use berth::ops;

use super::{GlobalArgs, Session};
use crate::cli::RunArgs;

pub fn execute(global: &GlobalArgs, args: RunArgs) -> Result<()> {
    let session = Session::open(global, &args.target)?;

    if args.dry_run {
        let cmd = ops::launch_command(&session.setup, &args.program, &args.args)?;
        println!("{}", cmd.display());
        return Ok(());
    }

    let code = ops::run(&session.setup, &args.program, &args.args)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
