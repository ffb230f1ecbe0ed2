//! Trigger events and the rules that decide whether they start a pipeline run

use crate::core::pattern::Pattern;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Kind of event delivered by the version-control host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
    MergeGroup,
    WorkflowDispatch,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
            EventKind::MergeGroup => "merge_group",
            EventKind::WorkflowDispatch => "workflow_dispatch",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventKind::Push),
            "pull_request" | "pull-request" => Ok(EventKind::PullRequest),
            "merge_group" | "merge-group" => Ok(EventKind::MergeGroup),
            "workflow_dispatch" | "workflow-dispatch" | "manual" => {
                Ok(EventKind::WorkflowDispatch)
            }
            other => Err(format!("Unknown event kind: {}", other)),
        }
    }
}

/// An incoming trigger notification
///
/// Immutable once received; every job of a run reads the same snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,

    /// Source branch (push) or head branch (pull request)
    #[serde(default)]
    pub branch: Option<String>,

    /// Files touched by the change
    #[serde(default)]
    pub changed_paths: Vec<String>,

    /// Commit to check out; the repository's current HEAD when absent
    #[serde(default)]
    pub commit: Option<String>,

    /// Clone source (URL or local path)
    #[serde(default)]
    pub repository: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            branch: None,
            changed_paths: Vec::new(),
            commit: None,
            repository: None,
        }
    }

    pub fn push(branch: &str, changed_paths: &[&str]) -> Self {
        Self::new(EventKind::Push)
            .with_branch(branch)
            .with_paths(changed_paths)
    }

    pub fn pull_request(changed_paths: &[&str]) -> Self {
        Self::new(EventKind::PullRequest).with_paths(changed_paths)
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = Some(branch.to_string());
        self
    }

    pub fn with_paths(mut self, changed_paths: &[&str]) -> Self {
        self.changed_paths = changed_paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_commit(mut self, commit: &str) -> Self {
        self.commit = Some(commit.to_string());
        self
    }

    pub fn with_repository(mut self, repository: &str) -> Self {
        self.repository = Some(repository.to_string());
        self
    }

    /// Load an event payload from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid event payload")
    }
}

/// Filters attached to a push or pull request trigger
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Allowed branches; empty means any branch
    pub branches: Vec<Pattern>,

    /// Path patterns; empty means any change
    pub paths: Vec<Pattern>,
}

impl EventFilter {
    fn branch_allowed(&self, branch: Option<&str>) -> bool {
        if self.branches.is_empty() {
            return true;
        }
        match branch {
            Some(branch) => self.branches.iter().any(|p| p.matches_name(branch)),
            None => false,
        }
    }

    /// The first changed path matching a declared pattern
    fn matching_path<'e>(&self, changed_paths: &'e [String]) -> Option<&'e str> {
        changed_paths
            .iter()
            .find(|path| self.paths.iter().any(|p| p.matches_path(path)))
            .map(String::as_str)
    }
}

/// Declarative trigger rules for a workflow
#[derive(Debug, Clone, Default)]
pub struct TriggerRules {
    pub push: Option<EventFilter>,
    pub pull_request: Option<EventFilter>,
    pub merge_group: bool,
    pub workflow_dispatch: bool,
}

/// Why an event did or did not start a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerDecision {
    pub matched: bool,
    pub reason: String,
}

impl TriggerDecision {
    fn matched(reason: impl Into<String>) -> Self {
        Self {
            matched: true,
            reason: reason.into(),
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            matched: false,
            reason: reason.into(),
        }
    }
}

impl TriggerRules {
    /// Evaluate an event against the rules
    pub fn evaluate(&self, event: &Event) -> TriggerDecision {
        match event.kind {
            EventKind::WorkflowDispatch if self.workflow_dispatch => {
                TriggerDecision::matched("manual dispatch always runs")
            }
            EventKind::MergeGroup if self.merge_group => {
                TriggerDecision::matched("merge group always runs")
            }
            EventKind::Push => match &self.push {
                Some(filter) => Self::evaluate_filter(filter, event),
                None => TriggerDecision::skipped("push is not a declared trigger"),
            },
            EventKind::PullRequest => match &self.pull_request {
                Some(filter) => Self::evaluate_filter(filter, event),
                None => TriggerDecision::skipped("pull_request is not a declared trigger"),
            },
            kind => TriggerDecision::skipped(format!("{} is not a declared trigger", kind)),
        }
    }

    /// Whether the event starts a pipeline run
    pub fn matches(&self, event: &Event) -> bool {
        self.evaluate(event).matched
    }

    fn evaluate_filter(filter: &EventFilter, event: &Event) -> TriggerDecision {
        if !filter.branch_allowed(event.branch.as_deref()) {
            return TriggerDecision::skipped(format!(
                "branch '{}' is not in the allowed branches",
                event.branch.as_deref().unwrap_or("<none>")
            ));
        }

        if filter.paths.is_empty() {
            return TriggerDecision::matched(format!("{} with no path filter", event.kind));
        }

        match filter.matching_path(&event.changed_paths) {
            Some(path) => TriggerDecision::matched(format!("{} touches {}", event.kind, path)),
            None => TriggerDecision::skipped("no changed path matches the path filter"),
        }
    }
}
