//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{BatchCommand, HistoryCommand, ReportCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Dependency-aware validation engine for data migrations
#[derive(Debug, Parser, Clone)]
#[command(name = "migration-validator")]
#[command(version)]
#[command(about = "Run migration validation pipelines and batch jobs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to engine settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a single pipeline
    Run(RunCommand),

    /// Validate a pipeline definition and show its levels
    Validate(ValidateCommand),

    /// Run several pipelines as one batch job
    Batch(BatchCommand),

    /// Build a report for a stored run or job
    Report(ReportCommand),

    /// Show stored runs
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
