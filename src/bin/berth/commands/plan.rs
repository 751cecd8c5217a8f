//! `berth plan` command

use anyhow::{Context, Result};

use berth::ops;

use super::{GlobalArgs, Session};
use crate::cli::PlanArgs;

pub fn execute(global: &GlobalArgs, args: PlanArgs) -> Result<()> {
    let session = Session::open(global, &args.target)?;
    let data_dir = session.data_dir(args.data_dir.as_ref());

    let binary = ops::binary_for(&session.setup, &args.binary);
    let pipeline = ops::derive(&binary, &session.setup, data_dir.as_deref())?;
    let plan = ops::describe(&pipeline, &session.setup)?;

    if args.json {
        let json = serde_json::to_string_pretty(&plan).context("failed to serialize plan")?;
        println!("{}", json);
    } else {
        print!("{}", ops::format_plan(&plan, &pipeline));
    }

    Ok(())
}
