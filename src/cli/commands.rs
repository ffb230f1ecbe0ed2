//! CLI command definitions

use crate::core::{Event, EventKind};
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Event description shared by `run` and `check`
#[derive(Debug, Args, Clone)]
pub struct EventArgs {
    /// Event kind: push, pull_request, merge_group, workflow_dispatch (or manual)
    #[arg(
        short = 'e',
        long = "event",
        default_value = "workflow_dispatch",
        value_parser = parse_event_kind
    )]
    pub kind: EventKind,

    /// Branch the event refers to
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Changed path (repeatable)
    #[arg(short, long)]
    pub path: Vec<String>,

    /// Commit to check out
    #[arg(long)]
    pub commit: Option<String>,

    /// Repository to fetch from
    #[arg(long)]
    pub repository: Option<String>,

    /// Read the whole event from a JSON file instead
    #[arg(long, conflicts_with_all = ["branch", "path", "commit"])]
    pub event_file: Option<PathBuf>,
}

impl EventArgs {
    /// Build the event, loading it from a file when one is given
    pub fn to_event(&self) -> Result<Event> {
        let mut event = match &self.event_file {
            Some(path) => Event::from_file(path)?,
            None => {
                let mut event = Event::new(self.kind);
                event.branch = self.branch.clone();
                event.changed_paths = self.path.clone();
                event.commit = self.commit.clone();
                event
            }
        };

        if self.repository.is_some() {
            event.repository = self.repository.clone();
        }
        Ok(event)
    }
}

/// Run the workflow for an event
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub event: EventArgs,

    /// Shared environment overrides (KEY=VALUE)
    #[arg(long, value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Root directory for job workspaces
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Cancel the remaining jobs after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,

    /// Leave the run's job workspaces on disk for inspection
    #[arg(long)]
    pub keep_workspace: bool,
}

/// Evaluate an event against the triggers
#[derive(Debug, Args, Clone)]
pub struct CheckCommand {
    #[command(flatten)]
    pub event: EventArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a workflow configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List the jobs of a workflow
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show the steps of each job
    #[arg(long)]
    pub steps: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(long)]
    pub workflow: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single execution
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Parse an event kind
pub fn parse_event_kind(s: &str) -> Result<EventKind, String> {
    s.parse()
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
