//! Persistence layer for pipeline run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::{describe_limit, JobState, PipelineRun};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Workflow name
    pub workflow_name: String,

    /// Kind of event that started the run
    pub event_kind: String,

    /// Run status
    pub status: ExecutionStatus,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished (if finished)
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of jobs that succeeded
    pub succeeded_jobs: usize,

    /// Total number of jobs
    pub total_jobs: usize,

    /// First failing job and where it failed, e.g. `style-check: failed-at-step-3 (style)`
    pub failure: Option<String>,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a pipeline run
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// List all runs of a workflow, newest first
    async fn list_executions(&self, workflow_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// List all workflow names
    async fn list_workflows(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    executions: tokio::sync::RwLock<std::collections::HashMap<Uuid, ExecutionSummary>>,
    by_workflow: tokio::sync::RwLock<std::collections::HashMap<String, Vec<Uuid>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            executions: tokio::sync::RwLock::new(std::collections::HashMap::new()),
            by_workflow: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut execs = self.executions.write().await;
        let replaced = execs
            .insert(execution.execution_id, execution.clone())
            .is_some();

        if !replaced {
            let mut by_workflow = self.by_workflow.write().await;
            by_workflow
                .entry(execution.workflow_name.clone())
                .or_default()
                .push(execution.execution_id);
        }

        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let execs = self.executions.read().await;
        Ok(execs.get(&execution_id).cloned())
    }

    async fn list_executions(&self, workflow_name: &str) -> Result<Vec<ExecutionSummary>> {
        let execs = self.executions.read().await;
        let by_workflow = self.by_workflow.read().await;

        let mut result: Vec<ExecutionSummary> = by_workflow
            .get(workflow_name)
            .map(|ids| ids.iter().filter_map(|id| execs.get(id).cloned()).collect())
            .unwrap_or_default();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let by_workflow = self.by_workflow.read().await;
        let mut names: Vec<String> = by_workflow.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Describe where a job went wrong
pub fn describe_failure(job_id: &str, state: &JobState) -> String {
    match state {
        JobState::FailedAtStep { step_id, error, .. } => {
            format!("{}: {} ({}): {}", job_id, state.label(), step_id, error)
        }
        JobState::SetupFailed { phase, error } => {
            format!("{}: {} (setup: {}): {}", job_id, state.label(), phase, error)
        }
        JobState::TimedOut { step, limit_ms } => match step {
            Some(step) => format!(
                "{}: {} at step {} after {}",
                job_id,
                state.label(),
                step,
                describe_limit(*limit_ms)
            ),
            None => format!(
                "{}: {} after {}",
                job_id,
                state.label(),
                describe_limit(*limit_ms)
            ),
        },
        JobState::Aborted { reason } => format!("{}: {} ({})", job_id, state.label(), reason),
        other => format!("{}: {}", job_id, other.label()),
    }
}

/// Create a summary from a pipeline run
pub fn create_summary(run: &PipelineRun) -> ExecutionSummary {
    ExecutionSummary {
        execution_id: run.execution_id,
        workflow_name: run.workflow_name.clone(),
        event_kind: run.event.kind.to_string(),
        status: run.status,
        started_at: run.started_at.unwrap_or_else(Utc::now),
        completed_at: run.completed_at,
        succeeded_jobs: run.succeeded_jobs(),
        total_jobs: run.jobs.len(),
        failure: run
            .failed_jobs()
            .first()
            .map(|job| describe_failure(&job.job_id, &job.state)),
    }
}
