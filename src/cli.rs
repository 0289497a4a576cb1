//! CLI argument parsing for `docflow`.
//!
//! The CLI stays thin: each subcommand maps onto one library entry point.
use crate::render::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "docflow",
    version,
    about = "Run document analysis workflows and batches",
    after_help = "Commands:\n  run --workflow <file>              Execute a workflow definition and print its report\n  batch --operation <op> <input>...  Run one operation over many inputs in parallel\n  check --workflow <file>            Load a workflow and list its steps\n  operations                         List registered operations\n\nExamples:\n  docflow run --workflow flows/review.yaml\n  docflow run --workflow flows/review.yaml --format json --out report.json\n  docflow batch --operation line_count --format csv docs/*.xml\n  docflow check --workflow flows/review.yaml",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Optional JSON config (defaults to $DOCFLOW_CONFIG)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Batch(BatchArgs),
    Check(CheckArgs),
    Operations,
}

#[derive(Parser, Debug)]
#[command(about = "Execute a workflow definition")]
pub struct RunArgs {
    /// Workflow definition (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub workflow: PathBuf,

    /// Report format (markdown or json; defaults to config)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report here instead of stdout
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Replace populated text outputs instead of preserving them
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Run one operation over many inputs")]
pub struct BatchArgs {
    /// Operation to run for each input
    #[arg(long, value_name = "NAME")]
    pub operation: String,

    /// Maximum jobs in flight (defaults to config)
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Summary format
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub format: OutputFormat,

    /// Extra operation parameter, repeatable
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Write the summary here instead of stdout
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Input documents
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Load a workflow and list its steps without running it")]
pub struct CheckArgs {
    /// Workflow definition (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub workflow: PathBuf,
}
