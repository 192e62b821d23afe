//! `plinth make` - bring module targets up to date.

use std::time::Instant;

use plinth_config::Overrides;
use plinth_engine::{MakeOptions, MakeReport};
use tracing::info;

use crate::pipeline::{display_location, global_overrides, open_module};
use crate::{GlobalArgs, MakeArgs};

/// Runs the `plinth make` command.
///
/// Makes the selected targets one after the other in selection order and
/// stops at the first error. Returns exit code 0 on success.
pub fn run(args: &MakeArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let overrides = make_overrides(args, global);
    let (mut session, module, settings) = open_module(global, &args.dir, &overrides)?;
    let targets = session.select_targets(module, &args.targets)?;
    let options = MakeOptions {
        recurse: settings.recurse,
        force: settings.force,
    };
    info!(
        pipeline = %session.codename_pipeline(module),
        targets = targets.len(),
        recurse = options.recurse,
        force = options.force,
        "making targets"
    );

    let start = Instant::now();
    let mut report = MakeReport::default();
    for id in targets {
        report.absorb(session.make(id, options)?);
    }

    if !global.quiet {
        let module_dir = session.module(module).directory().to_path_buf();
        for id in &report.made {
            eprintln!(
                "       Made {}",
                display_location(session.target(*id).location(), &module_dir)
            );
        }
        eprintln!(
            "   Finished {} ({} made, {} up to date) in {:.2}s",
            session.codename_pipeline(module),
            report.made.len(),
            report.up_to_date,
            start.elapsed().as_secs_f64()
        );
    }
    Ok(0)
}

/// Merges the `make` flags into the global overrides.
fn make_overrides(args: &MakeArgs, global: &GlobalArgs) -> Overrides {
    Overrides {
        force: args.force.then_some(true),
        recurse: args.no_recurse.then_some(false),
        ..global_overrides(global)
    }
}
