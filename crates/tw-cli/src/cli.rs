//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Tidewater - dependency-aware SQL action runner
#[derive(Parser, Debug)]
#[command(name = "tw")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the execution graph without running it
    Build(BuildArgs),

    /// Build the execution graph and run it against the warehouse
    Run(RunArgs),
}

/// Which actions to include and how to build them
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Compiled graph JSON (default: <project>/compiled_graph.json)
    #[arg(short, long)]
    pub graph: Option<String>,

    /// Action names to include, `*` wildcards allowed (comma-separated)
    #[arg(short, long)]
    pub nodes: Option<String>,

    /// Include actions carrying any of these tags (comma-separated)
    #[arg(short, long)]
    pub tags: Option<String>,

    /// Also include every transitive dependency of the selection
    #[arg(long)]
    pub include_deps: bool,

    /// Also include every transitive dependent of the selection
    #[arg(long)]
    pub include_dependents: bool,

    /// Rebuild incremental tables from scratch
    #[arg(long)]
    pub full_refresh: bool,
}

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Write the execution graph to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Cancel the run after this many milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Skip actions whose definition and inputs are unchanged.
    ///
    /// DuckDB reports no table modification time, so changes made to a
    /// table outside tw are not detected and its cache entry stays valid.
    #[arg(long, conflicts_with = "no_run_cache")]
    pub run_cache: bool,

    /// Never skip actions based on the run cache
    #[arg(long)]
    pub no_run_cache: bool,

    /// Do not write descriptions and labels after building tables
    #[arg(long)]
    pub disable_set_metadata: bool,

    /// Override execution.action_retry_limit
    #[arg(long)]
    pub retries: Option<u32>,

    /// Resume the previous run from <target>/run_result.json
    #[arg(long)]
    pub resume: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Suppress the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format for run results
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable report
    #[default]
    Text,
    /// The run result as JSON
    Json,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
