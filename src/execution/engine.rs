//! Main execution engine - evaluates triggers and runs the jobs of a workflow

use crate::{
    command::CommandExecutor,
    core::{Event, JobRun, JobState, PipelineRun, Workflow},
    execution::{
        events::{EventBus, ExecutionEvent},
        executor::{CancelSignal, JobContext, JobExecutor},
    },
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// What happens to sibling jobs when one job fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// Every job runs to completion before aggregation
    #[default]
    WaitAll,

    /// Remaining jobs are cancelled after the first failure
    FailFast,
}

/// Pipeline coordinator
pub struct ExecutionEngine<E: ?Sized> {
    executor: Arc<E>,
    policy: CompletionPolicy,
    workspace_root: PathBuf,
    keep_workspace: bool,
    events: EventBus,
}

impl<E: CommandExecutor + ?Sized + 'static> ExecutionEngine<E> {
    /// Create an engine whose job workspaces live under `workspace_root`
    pub fn new(executor: Arc<E>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            policy: CompletionPolicy::default(),
            workspace_root: workspace_root.into(),
            keep_workspace: false,
            events: EventBus::new(),
        }
    }

    pub fn with_policy(mut self, policy: CompletionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Leave `<workspace_root>/<execution-id>` on disk after the run
    pub fn with_keep_workspace(mut self, keep: bool) -> Self {
        self.keep_workspace = keep;
        self
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler).await;
    }

    /// Evaluate the triggers and run the workflow if the event matches
    ///
    /// Returns `None` when the event does not start a run.
    pub async fn dispatch(&self, workflow: &Workflow, event: Event) -> Option<PipelineRun> {
        let decision = workflow.evaluate(&event);
        if !decision.matched {
            info!("Skipping {}: {}", workflow.name, decision.reason);
            self.events
                .emit(ExecutionEvent::PipelineSkipped {
                    workflow_name: workflow.name.clone(),
                    reason: decision.reason,
                })
                .await;
            return None;
        }

        info!("Triggered {}: {}", workflow.name, decision.reason);
        Some(self.execute(workflow, event).await)
    }

    /// Run every job of the workflow concurrently and aggregate the outcome
    pub async fn execute(&self, workflow: &Workflow, event: Event) -> PipelineRun {
        let mut run = workflow.create_run(event);
        let execution_id = run.execution_id;
        run.start();

        info!(
            "Starting pipeline execution: {} ({})",
            workflow.name, execution_id
        );
        self.events
            .emit(ExecutionEvent::PipelineStarted {
                execution_id,
                workflow_name: workflow.name.clone(),
                event_kind: run.event.kind,
                jobs: workflow.jobs.len(),
            })
            .await;

        let event = Arc::new(run.event.clone());
        let run_root = self.workspace_root.join(execution_id.to_string());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, mut done_rx) =
            mpsc::channel::<(usize, JobRun)>(workflow.jobs.len().max(1));

        let mut handles = Vec::with_capacity(workflow.jobs.len());
        for (index, job) in workflow.jobs.iter().enumerate() {
            let job = job.clone();
            let context = JobContext {
                environment: workflow.environment.clone(),
                event: event.clone(),
                workspace: run_root.join(&job.id),
            };
            let job_executor = JobExecutor::new(self.executor.clone(), self.events.clone());
            let cancel = CancelSignal::new(cancel_rx.clone());
            let done_tx = done_tx.clone();

            handles.push(tokio::spawn(async move {
                let job_run = job_executor.run(&job, &context, cancel).await;
                // Receiver only goes away if the coordinator itself is gone
                let _ = done_tx.send((index, job_run)).await;
            }));
        }
        drop(done_tx);

        let mut results: Vec<Option<JobRun>> = vec![None; workflow.jobs.len()];
        while let Some((index, job_run)) = done_rx.recv().await {
            let failed = !job_run.is_success();
            results[index] = Some(job_run);

            if failed && self.policy == CompletionPolicy::FailFast {
                warn!("Fail-fast: cancelling remaining jobs of {}", execution_id);
                let _ = cancel_tx.send(true);
            }
        }

        for (index, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!("Job task {} crashed: {}", workflow.jobs[index].id, e);
            }
        }

        for (slot, job) in run.jobs.iter_mut().zip(results) {
            match job {
                Some(job_run) => *slot = job_run,
                None => {
                    let _ = slot.transition(JobState::Aborted {
                        reason: "job task ended without reporting".to_string(),
                    });
                }
            }
        }

        run.finish();
        info!(
            "Pipeline execution finished: {} - {:?}",
            workflow.name, run.status
        );

        if self.keep_workspace {
            info!("Keeping workspace {}", run_root.display());
        } else {
            remove_workspace(&run_root).await;
        }
        self.events
            .emit(ExecutionEvent::PipelineCompleted {
                execution_id,
                status: run.status,
            })
            .await;

        run
    }
}

/// Delete a finished run's checkouts and build output
async fn remove_workspace(run_root: &Path) {
    match tokio::fs::remove_dir_all(run_root).await {
        Ok(()) => debug!("Removed workspace {}", run_root.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove workspace {}: {}", run_root.display(), e),
    }
}
