//! Execution events emitted while a pipeline runs

use crate::core::{EventKind, ExecutionStatus, JobState, SetupPhase};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    /// The event did not match the workflow triggers
    PipelineSkipped {
        workflow_name: String,
        reason: String,
    },
    PipelineStarted {
        execution_id: Uuid,
        workflow_name: String,
        event_kind: EventKind,
        jobs: usize,
    },
    JobStarted {
        job_id: String,
    },
    SetupPhaseStarted {
        job_id: String,
        phase: SetupPhase,
    },
    StepStarted {
        job_id: String,
        step: usize,
        step_id: String,
    },
    StepFinished {
        job_id: String,
        step: usize,
        step_id: String,
        success: bool,
    },
    JobFinished {
        job_id: String,
        state: JobState,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to registered handlers
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event handler
    pub async fn subscribe<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.handlers.write().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    pub async fn emit(&self, event: ExecutionEvent) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}
