//! Workflow domain model

use crate::core::{
    config::WorkflowConfig,
    environment::SharedEnvironment,
    job::JobDefinition,
    state::{JobRun, PipelineRun},
    trigger::{Event, TriggerDecision, TriggerRules},
};
use anyhow::Result;
use std::sync::Arc;

/// A validated workflow: trigger rules, shared environment and jobs
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow name
    pub name: String,

    /// When the workflow runs
    pub triggers: TriggerRules,

    /// Configuration visible to every step of every job
    pub environment: Arc<SharedEnvironment>,

    /// Jobs, dispatched concurrently
    pub jobs: Vec<JobDefinition>,
}

impl Workflow {
    /// Create a workflow from configuration
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        Ok(Workflow {
            name: config.name.clone(),
            triggers: config.trigger_rules()?,
            environment: Arc::new(config.environment()),
            jobs: config.jobs.iter().map(JobDefinition::from_config).collect(),
        })
    }

    /// The workflow embedded in the binary
    pub fn builtin() -> Result<Self> {
        WorkflowConfig::builtin()?.to_workflow()
    }

    /// Get a job by ID
    pub fn job(&self, id: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Replace the shared environment before any run starts
    pub fn with_environment(mut self, environment: SharedEnvironment) -> Self {
        self.environment = Arc::new(environment);
        self
    }

    /// Decide whether an event starts a run
    pub fn evaluate(&self, event: &Event) -> TriggerDecision {
        self.triggers.evaluate(event)
    }

    /// Create a pending run with one job run per job definition
    pub fn create_run(&self, event: Event) -> PipelineRun {
        let jobs = self
            .jobs
            .iter()
            .map(|job| JobRun::new(&job.id, &job.name))
            .collect();
        PipelineRun::new(&self.name, event, jobs)
    }
}
