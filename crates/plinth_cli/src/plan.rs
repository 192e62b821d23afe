//! `plinth plan` - list the stale targets of a module grouped by depth.

use plinth_engine::{PlanStage, Session, TargetId};
use serde_json::json;

use crate::pipeline::{display_location, global_overrides, open_module};
use crate::{GlobalArgs, PlanArgs, ReportFormat};

/// Runs the `plinth plan` command.
///
/// Nothing is made. Returns exit code 0 when there is nothing to do and 2
/// when at least one target is stale.
pub fn run(args: &PlanArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (session, module, _) = open_module(global, &args.dir, &global_overrides(global))?;
    let roots: Vec<TargetId> = session.module(module).targets().values().copied().collect();
    let stages = session.plan(&roots)?;
    let module_dir = session.module(module).directory();

    match args.format {
        ReportFormat::Text => print!("{}", render_text(&session, &stages, module_dir)),
        ReportFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&render_json(&session, &stages, module_dir))?
        ),
    }
    Ok(if stages.is_empty() { 0 } else { 2 })
}

fn render_text(session: &Session, stages: &[PlanStage], module_dir: &std::path::Path) -> String {
    if stages.is_empty() {
        return "nothing to do\n".to_string();
    }
    let mut out = String::new();
    for stage in stages {
        out.push_str(&format!("depth {}:\n", stage.depth));
        for job in &stage.jobs {
            out.push_str(&format!(
                "  {:<40} {:<6} {}\n",
                display_location(session.target(job.target).location(), module_dir),
                job.parallelism_hint,
                job.reason
            ));
        }
    }
    out
}

fn render_json(
    session: &Session,
    stages: &[PlanStage],
    module_dir: &std::path::Path,
) -> serde_json::Value {
    let stages: Vec<_> = stages
        .iter()
        .map(|stage| {
            let jobs: Vec<_> = stage
                .jobs
                .iter()
                .map(|job| {
                    json!({
                        "location": display_location(session.target(job.target).location(), module_dir),
                        "reason": job.reason,
                        "parallelism_hint": job.parallelism_hint,
                    })
                })
                .collect();
            json!({ "depth": stage.depth, "jobs": jobs })
        })
        .collect();
    json!({ "stages": stages })
}
