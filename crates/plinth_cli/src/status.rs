//! `plinth status` - show the state of every target of a module.

use crate::pipeline::{display_location, global_overrides, open_module};
use crate::{GlobalArgs, StatusArgs};

/// Runs the `plinth status` command.
///
/// Prints the pipeline codename, then one line per exported target. Returns
/// exit code 0 when everything is up to date and 2 otherwise.
pub fn run(args: &StatusArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (session, module, _) = open_module(global, &args.dir, &global_overrides(global))?;
    let m = session.module(module);
    println!("{}", session.codename_pipeline(module));

    let mut stale = 0;
    for (name, id) in m.targets() {
        let target = session.target(*id);
        let staleness = session.staleness(*id)?;
        if !staleness.is_up_to_date() {
            stale += 1;
        }
        println!(
            "  {name:<24} {:<28} {}@{}  {}",
            staleness.to_string(),
            target.depth(),
            target.parallelism_hint(),
            display_location(target.location(), m.directory())
        );
        if args.detailed {
            println!("      {}", target.detailed_description());
        }
    }
    if !global.quiet {
        eprintln!("{} targets, {stale} stale", m.targets().len());
    }
    Ok(if stale == 0 { 0 } else { 2 })
}
