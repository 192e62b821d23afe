//! Plinth CLI - the command-line interface of the plinth build engine.
//!
//! Provides `plinth make` to bring module targets up to date, `plinth status`
//! and `plinth plan` to inspect what is stale, and `plinth init` for
//! scaffolding pipelines and modules.

#![warn(missing_docs)]

mod init;
mod make;
mod pipeline;
mod plan;
mod status;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Plinth - incremental builds of file-backed targets.
#[derive(Parser, Debug)]
#[command(name = "plinth", version, about = "Plinth incremental build engine")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `plinth.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Directory tree searched for module descriptions.
    #[arg(long, global = true)]
    pub source_space: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bring targets of a module up to date.
    Make(MakeArgs),
    /// Show which targets of a module are up to date.
    Status(StatusArgs),
    /// List stale targets grouped by depth.
    Plan(PlanArgs),
    /// Scaffold a pipeline configuration or a module.
    Init(InitArgs),
}

/// Arguments for the `plinth make` subcommand.
#[derive(Parser, Debug)]
pub struct MakeArgs {
    /// Module directory.
    pub dir: String,

    /// Target names; a primary name also selects its secondary targets.
    /// Defaults to every exported target.
    pub targets: Vec<String>,

    /// Run makers even for up-to-date targets.
    #[arg(short, long)]
    pub force: bool,

    /// Do not make dependencies first.
    #[arg(long)]
    pub no_recurse: bool,
}

/// Arguments for the `plinth status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Module directory.
    pub dir: String,

    /// Include the format's detailed description of every target.
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for the `plinth plan` subcommand.
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Module directory.
    pub dir: String,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `plinth init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to initialize.
    pub dir: String,

    /// Create a module directory of this name inside `dir` instead of a
    /// `plinth.toml`.
    #[arg(short, long)]
    pub module: Option<String>,

    /// Mark the new module as a root.
    #[arg(long, requires = "module")]
    pub root: bool,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
    /// Optional source space overriding the configuration.
    pub source_space: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
        source_space: cli.source_space,
    };

    let result = match cli.command {
        Command::Make(ref args) => make::run(args, &global),
        Command::Status(ref args) => status::run(args, &global),
        Command::Plan(ref args) => plan::run(args, &global),
        Command::Init(ref args) => init::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the stderr log subscriber.
///
/// `--verbose` and `--quiet` take precedence over `RUST_LOG`.
fn init_logging(quiet: bool, verbose: bool) {
    let filter = match log_level(quiet, verbose) {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn log_level(quiet: bool, verbose: bool) -> Option<&'static str> {
    if verbose {
        Some("debug")
    } else if quiet {
        Some("error")
    } else {
        None
    }
}
