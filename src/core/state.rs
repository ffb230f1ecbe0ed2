//! Execution state models

use crate::core::trigger::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Overall pipeline run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Jobs are running
    Running,
    /// Every job succeeded
    Succeeded,
    /// At least one job did not succeed
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded | ExecutionStatus::Failed)
    }
}

/// Environment Initializer phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupPhase {
    Checkout,
    Toolchain,
    DiskQuota,
    Packages,
}

impl fmt::Display for SetupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupPhase::Checkout => "checkout",
            SetupPhase::Toolchain => "toolchain",
            SetupPhase::DiskQuota => "disk quota",
            SetupPhase::Packages => "packages",
        };
        f.write_str(name)
    }
}

/// State of a single job run
///
/// `Pending → Initializing → Running → {Succeeded | FailedAtStep |
/// SetupFailed | TimedOut | Aborted}`. Terminal states are final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be dispatched
    Pending,
    /// Environment Initializer is running the given phase
    Initializing { phase: SetupPhase },
    /// Step `step` (1-indexed) is running
    Running { step: usize },
    /// Every step exited successfully
    Succeeded,
    /// Step `step` failed; later steps never ran. Positions are 1-indexed
    /// and a declared setup occupies position 1.
    FailedAtStep {
        step: usize,
        step_id: String,
        error: String,
    },
    /// The Environment Initializer failed; always reported as step 1
    SetupFailed { phase: SetupPhase, error: String },
    /// The job exceeded its timeout; `step` is the position that was cut off
    TimedOut { step: Option<usize>, limit_ms: u64 },
    /// Cancelled by the coordinator or lost to a crashed task
    Aborted { reason: String },
}

impl JobState {
    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            JobState::Pending | JobState::Initializing { .. } | JobState::Running { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobState::Succeeded)
    }

    /// Short label such as `failed-at-step-3`
    pub fn label(&self) -> String {
        match self {
            JobState::Pending => "pending".to_string(),
            JobState::Initializing { .. } => "initializing".to_string(),
            JobState::Running { step } => format!("running(step {})", step),
            JobState::Succeeded => "success".to_string(),
            JobState::FailedAtStep { step, .. } => format!("failed-at-step-{}", step),
            JobState::SetupFailed { .. } => "failed-at-step-1".to_string(),
            JobState::TimedOut { .. } => "timed-out".to_string(),
            JobState::Aborted { .. } => "aborted".to_string(),
        }
    }
}

/// Render a timeout limit without losing sub-second precision
pub fn describe_limit(limit_ms: u64) -> String {
    if limit_ms % 1000 == 0 {
        format!("{}s", limit_ms / 1000)
    } else {
        format!("{}ms", limit_ms)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("job '{job_id}' is already {state}; cannot move to {next}")]
    AlreadyTerminal {
        job_id: String,
        state: String,
        next: String,
    },
}

/// A live instance of a job definition bound to one event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub job_id: String,
    pub job_name: String,
    pub state: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRun {
    pub fn new(job_id: &str, job_name: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            job_name: job_name.to_string(),
            state: JobState::Pending,
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to the next state, refusing to leave a terminal state
    pub fn transition(&mut self, next: JobState) -> Result<(), StateError> {
        if self.state.is_terminal() {
            return Err(StateError::AlreadyTerminal {
                job_id: self.job_id.clone(),
                state: self.state.label(),
                next: next.label(),
            });
        }

        if self.started_at.is_none() && !matches!(next, JobState::Pending) {
            self.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        self.state = next;
        Ok(())
    }

    /// The step currently running, if any
    pub fn current_step(&self) -> Option<usize> {
        match self.state {
            JobState::Running { step } => Some(step),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }
}

/// One pipeline run: a job run per job definition, for one event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Workflow name
    pub workflow_name: String,

    /// The event that started the run
    pub event: Event,

    pub status: ExecutionStatus,

    pub jobs: Vec<JobRun>,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(workflow_name: &str, event: Event, jobs: Vec<JobRun>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            workflow_name: workflow_name.to_string(),
            event,
            status: ExecutionStatus::Pending,
            jobs,
            started_at: None,
            completed_at: None,
        }
    }

    /// Mark the run as started
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Aggregate job outcomes: success only if every job succeeded
    pub fn finish(&mut self) {
        self.status = aggregate(self.jobs.iter().map(|j| &j.state));
        self.completed_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    pub fn job(&self, job_id: &str) -> Option<&JobRun> {
        self.jobs.iter().find(|j| j.job_id == job_id)
    }

    /// Jobs that did not succeed
    pub fn failed_jobs(&self) -> Vec<&JobRun> {
        self.jobs
            .iter()
            .filter(|j| j.state.is_terminal() && !j.is_success())
            .collect()
    }

    pub fn succeeded_jobs(&self) -> usize {
        self.jobs.iter().filter(|j| j.is_success()).count()
    }
}

/// AND-reduction over job states
pub fn aggregate<'a, I>(states: I) -> ExecutionStatus
where
    I: IntoIterator<Item = &'a JobState>,
{
    let mut any = false;
    for state in states {
        any = true;
        if !state.is_success() {
            return ExecutionStatus::Failed;
        }
    }
    if any {
        ExecutionStatus::Succeeded
    } else {
        ExecutionStatus::Failed
    }
}
