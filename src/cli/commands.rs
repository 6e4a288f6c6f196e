//! CLI command definitions

use crate::core::state::ExecutionMode;
use clap::{ArgGroup, Args};
use std::path::PathBuf;

/// Run a single pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Skip later levels once a level has a FAIL or ERROR
    #[arg(long)]
    pub stop_on_error: bool,

    /// Worker cap within a level
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Don't store the result
    #[arg(long)]
    pub no_history: bool,

    /// Print the sealed result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Run several pipelines as one job
#[derive(Debug, Args, Clone)]
pub struct BatchCommand {
    /// Pipeline YAML files, in order
    #[arg(short, long, required = true)]
    pub file: Vec<PathBuf>,

    /// Job name (defaults to "batch")
    #[arg(long, default_value = "batch")]
    pub name: String,

    #[arg(long, value_enum, default_value_t = ModeArg::Sequential)]
    pub mode: ModeArg,

    /// Worker pool size in parallel mode (defaults to the settings file)
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Stop dispatching once an operation fails
    #[arg(long)]
    pub stop_on_error: bool,

    /// Don't store results
    #[arg(long)]
    pub no_history: bool,

    /// Print the final job as JSON
    #[arg(long)]
    pub json: bool,
}

/// Build a report from stored results
#[derive(Debug, Args, Clone)]
#[command(group(ArgGroup::new("target").required(true).args(["run_id", "job_id"])))]
pub struct ReportCommand {
    /// Report on a single run
    #[arg(long)]
    pub run_id: Option<String>,

    /// Report on every run of a batch job
    #[arg(long)]
    pub job_id: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show stored runs
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Batch execution mode argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    Sequential,
    Parallel,
}

impl From<ModeArg> for ExecutionMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Sequential => ExecutionMode::Sequential,
            ModeArg::Parallel => ExecutionMode::Parallel,
        }
    }
}
