//! Job executor - runs one job's setup and steps to completion or first failure

use crate::{
    command::{CommandExecutor, Invocation},
    core::{
        Event, JobDefinition, JobRun, JobState, SetupPhase, SharedEnvironment, Step, StepAction,
    },
    execution::{
        events::{EventBus, ExecutionEvent},
        initializer::EnvironmentInitializer,
    },
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Everything a job reads while it runs; shared read-only with sibling jobs
#[derive(Debug, Clone)]
pub struct JobContext {
    pub environment: Arc<SharedEnvironment>,
    pub event: Arc<Event>,
    /// Private workspace root for this job
    pub workspace: PathBuf,
}

/// Result of executing a single step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Success,
    Failed { error: String },
}

/// Cancellation signal from the coordinator
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Sender gone without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

enum Finish {
    Completed,
    TimedOut,
    Cancelled,
}

/// Executes a single job
pub struct JobExecutor<E: ?Sized> {
    executor: Arc<E>,
    events: EventBus,
}

impl<E: CommandExecutor + ?Sized> JobExecutor<E> {
    pub fn new(executor: Arc<E>, events: EventBus) -> Self {
        Self { executor, events }
    }

    /// Run the job and return its terminal run record
    ///
    /// The timeout covers setup and steps. When it fires, or the job is
    /// cancelled, the in-flight command future is dropped, which kills the
    /// command's process group.
    pub async fn run(
        &self,
        job: &JobDefinition,
        context: &JobContext,
        mut cancel: CancelSignal,
    ) -> JobRun {
        let mut run = JobRun::new(&job.id, &job.name);
        info!("Starting job: {}", job.id);
        self.events
            .emit(ExecutionEvent::JobStarted {
                job_id: job.id.clone(),
            })
            .await;

        let finish = {
            let drive = timeout(job.timeout, self.drive(job, context, &mut run));
            tokio::select! {
                result = drive => match result {
                    Ok(()) => Finish::Completed,
                    Err(_) => Finish::TimedOut,
                },
                _ = cancel.cancelled() => Finish::Cancelled,
            }
        };

        match finish {
            Finish::Completed => {}
            Finish::TimedOut => {
                error!("Job {} timed out after {:?}", job.id, job.timeout);
                let step = match run.state {
                    JobState::Initializing { .. } if !job.setup.is_empty() => Some(1),
                    _ => run.current_step(),
                };
                advance(
                    &mut run,
                    JobState::TimedOut {
                        step,
                        limit_ms: job.timeout.as_millis() as u64,
                    },
                );
            }
            Finish::Cancelled => {
                warn!("Job {} cancelled", job.id);
                advance(
                    &mut run,
                    JobState::Aborted {
                        reason: "cancelled after a sibling job failed".to_string(),
                    },
                );
            }
        }

        info!("Job {} finished: {}", job.id, run.state.label());
        self.events
            .emit(ExecutionEvent::JobFinished {
                job_id: job.id.clone(),
                state: run.state.clone(),
            })
            .await;

        run
    }

    /// Setup, then steps in declared order, stopping at the first failure
    ///
    /// A declared setup is reported as step 1 and shifts the steps after it.
    async fn drive(&self, job: &JobDefinition, context: &JobContext, run: &mut JobRun) {
        advance(
            run,
            JobState::Initializing {
                phase: SetupPhase::Checkout,
            },
        );

        if let Err(e) = tokio::fs::create_dir_all(&context.workspace).await {
            advance(
                run,
                JobState::SetupFailed {
                    phase: SetupPhase::Checkout,
                    error: format!(
                        "cannot create workspace {}: {}",
                        context.workspace.display(),
                        e
                    ),
                },
            );
            return;
        }

        let initializer =
            EnvironmentInitializer::new(&job.setup, &context.environment, &context.event);
        let plan = match initializer.plan() {
            Ok(plan) => plan,
            Err(e) => {
                error!("Job {} setup failed: {}", job.id, e);
                advance(
                    run,
                    JobState::SetupFailed {
                        phase: e.phase(),
                        error: e.to_string(),
                    },
                );
                return;
            }
        };

        for action in &plan {
            advance(run, JobState::Initializing { phase: action.phase });
            self.events
                .emit(ExecutionEvent::SetupPhaseStarted {
                    job_id: job.id.clone(),
                    phase: action.phase,
                })
                .await;

            if let Err(e) = initializer
                .run_phase(self.executor.as_ref(), action, &context.workspace)
                .await
            {
                error!("Job {} setup failed: {}", job.id, e);
                advance(
                    run,
                    JobState::SetupFailed {
                        phase: e.phase(),
                        error: e.to_string(),
                    },
                );
                return;
            }
        }

        let first = job.first_step_position();
        for (index, step) in job.steps.iter().enumerate() {
            let position = first + index;
            advance(run, JobState::Running { step: position });
            self.events
                .emit(ExecutionEvent::StepStarted {
                    job_id: job.id.clone(),
                    step: position,
                    step_id: step.id.clone(),
                })
                .await;

            let result = self.execute_step(job, step, context).await;
            self.events
                .emit(ExecutionEvent::StepFinished {
                    job_id: job.id.clone(),
                    step: position,
                    step_id: step.id.clone(),
                    success: result == StepResult::Success,
                })
                .await;

            if let StepResult::Failed { error } = result {
                error!(
                    "Job {} failed at step {} ({}): {}",
                    job.id, position, step.id, error
                );
                advance(
                    run,
                    JobState::FailedAtStep {
                        step: position,
                        step_id: step.id.clone(),
                        error,
                    },
                );
                return;
            }
        }

        advance(run, JobState::Succeeded);
    }

    /// Execute one step and classify its result
    pub async fn execute_step(
        &self,
        job: &JobDefinition,
        step: &Step,
        context: &JobContext,
    ) -> StepResult {
        let command = step.render_command(&context.environment);
        let working_dir = job.step_directory(&context.workspace, step);
        info!("[{}] {}: {}", job.id, step.name, command);

        let invocation =
            Invocation::new(command, working_dir).with_env(context.environment.iter());
        let output = match self.executor.execute(&invocation).await {
            Ok(output) => output,
            Err(e) => {
                return StepResult::Failed {
                    error: e.to_string(),
                }
            }
        };

        if !output.is_success() {
            return StepResult::Failed {
                error: output.describe_failure(),
            };
        }

        if let StepAction::VerifyClean { .. } = step.action {
            let drifted: Vec<&str> = output
                .stdout
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect();
            if !drifted.is_empty() {
                return StepResult::Failed {
                    error: format!("uncommitted changes: {}", drifted.join(", ")),
                };
            }
        }

        StepResult::Success
    }
}

/// Apply a state transition; terminal states are never left
fn advance(run: &mut JobRun, next: JobState) {
    if let Err(e) = run.transition(next) {
        warn!("{}", e);
    }
}
