//! `berth flags` command

use anyhow::Result;

use berth::core::{FlagKind, TargetKind};

use super::{GlobalArgs, Session};
use crate::cli::FlagsArgs;

pub fn execute(global: &GlobalArgs, args: FlagsArgs) -> Result<()> {
    let session = Session::open(global, &args.target)?;
    let setup = &session.setup;

    let flags = match &args.name {
        Some(name) => {
            let kind = if args.test {
                TargetKind::Test
            } else if args.library {
                TargetKind::Library
            } else {
                TargetKind::Program
            };
            setup.target_flags(name, kind)
        }
        None => setup.flags.clone(),
    };

    let label = args.name.as_deref().unwrap_or("all targets");

    for (kind, values) in flags.iter() {
        let wanted = if args.compile {
            kind.is_compile()
        } else if args.link {
            !kind.is_compile()
        } else {
            true
        };
        if !wanted {
            continue;
        }

        println!("# {} for `{}` ({}):", kind_label(kind), label, setup.target);
        for value in values {
            println!("  {}", value);
        }
    }

    Ok(())
}

fn kind_label(kind: FlagKind) -> &'static str {
    match kind {
        FlagKind::CFlags => "C flags",
        FlagKind::CxxFlags => "C++ flags",
        FlagKind::LinkFlags => "Link flags",
        FlagKind::LibPath => "Library paths",
        FlagKind::CppPath => "Include paths",
        FlagKind::Defines => "Defines",
    }
}
