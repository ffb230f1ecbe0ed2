//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{CheckCommand, HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Path-gated CI runner for the horaedb metric engine
#[derive(Debug, Parser, Clone)]
#[command(name = "ci-gate")]
#[command(author = "ci-gate Contributors")]
#[command(version = "0.1.0")]
#[command(
    about = "Runs the horaedb CI jobs when a change touches the metric engine",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workflow YAML file (the built-in workflow when omitted)
    #[arg(short, long, global = true)]
    pub file: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Evaluate an event and run the workflow if it matches
    Run(RunCommand),

    /// Evaluate an event against the triggers without running anything
    Check(CheckCommand),

    /// Validate a workflow configuration
    Validate(ValidateCommand),

    /// List the jobs and steps of a workflow
    List(ListCommand),

    /// Show execution history
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
