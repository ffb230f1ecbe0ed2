//! Workflow configuration from YAML

use crate::core::{
    environment::SharedEnvironment,
    job::StepAction,
    pattern::Pattern,
    trigger::{EventFilter, TriggerRules},
    Workflow,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};

/// The workflow shipped with the binary
pub const BUILTIN_WORKFLOW: &str = include_str!("../../workflows/horaedb-ci.yml");

/// Top-level workflow configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    pub name: String,

    /// Events that start a run
    #[serde(rename = "on", default)]
    pub triggers: TriggerConfig,

    /// Shared environment visible to every step
    #[serde(default)]
    env: BTreeMap<String, Value>,

    /// Jobs, run in parallel
    pub jobs: Vec<JobConfig>,
}

/// Trigger declarations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub push: Option<FilterConfig>,

    #[serde(default)]
    pub pull_request: Option<FilterConfig>,

    /// Declared with `merge_group: {}`
    #[serde(default)]
    pub merge_group: Option<MarkerConfig>,

    /// Declared with `workflow_dispatch: {}`
    #[serde(default)]
    pub workflow_dispatch: Option<MarkerConfig>,
}

/// Branch and path filters for push / pull_request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub branches: Vec<String>,

    #[serde(default)]
    pub paths: Vec<String>,
}

/// A trigger without filters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkerConfig {}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job identifier
    pub id: String,

    /// Human-readable job name
    #[serde(default)]
    pub name: Option<String>,

    /// Job timeout in minutes
    #[serde(default)]
    pub timeout_minutes: Option<u64>,

    /// Default working directory for the job's steps
    #[serde(default)]
    pub working_directory: Option<String>,

    /// Environment preparation before the first step
    #[serde(default)]
    pub setup: Option<SetupConfig>,

    /// Ordered steps
    pub steps: Vec<StepConfig>,
}

/// Environment Initializer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupConfig {
    #[serde(default)]
    pub checkout: Option<CheckoutConfig>,

    /// Toolchain version, may reference the shared environment
    #[serde(default)]
    pub toolchain: Option<String>,

    /// Command that enforces the disk quota
    #[serde(default)]
    pub disk_quota: Option<String>,

    #[serde(default)]
    pub packages: Vec<String>,

    /// Overrides the default `sudo apt-get install --yes`
    #[serde(default)]
    pub package_installer: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Also fetch nested submodules
    #[serde(default)]
    pub submodules: bool,

    /// Shallow fetch depth
    #[serde(default)]
    pub depth: Option<u32>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step identifier, unique within the job
    pub id: String,

    /// Human-readable step name
    #[serde(default)]
    pub name: Option<String>,

    /// `run: <command>` or `verify_clean: { paths: [...] }`
    #[serde(flatten)]
    pub action: StepActionConfig,

    /// Overrides the job working directory
    #[serde(default)]
    pub working_directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepActionConfig {
    Run(String),
    VerifyClean {
        #[serde(default)]
        paths: Vec<String>,
    },
}

impl From<StepActionConfig> for StepAction {
    fn from(config: StepActionConfig) -> Self {
        match config {
            StepActionConfig::Run(command) => StepAction::Run(command),
            StepActionConfig::VerifyClean { paths } => StepAction::VerifyClean { paths },
        }
    }
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse workflow configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The workflow embedded in the binary
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_WORKFLOW).context("Built-in workflow is invalid")
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            anyhow::bail!("Workflow '{}' declares no jobs", self.name);
        }

        let mut seen_jobs = HashSet::new();
        for job in &self.jobs {
            if !seen_jobs.insert(&job.id) {
                anyhow::bail!("Duplicate job ID: {}", job.id);
            }

            if !is_single_component(&job.id) {
                anyhow::bail!(
                    "Job ID '{}' must be a single path component without separators",
                    job.id
                );
            }

            if let Some(dir) = &job.working_directory {
                check_relative_dir(dir).with_context(|| format!("Job '{}'", job.id))?;
            }

            if job.steps.is_empty() {
                anyhow::bail!("Job '{}' has no steps", job.id);
            }

            if job.timeout_minutes == Some(0) {
                anyhow::bail!("Job '{}' has a zero timeout", job.id);
            }

            let mut seen_steps = HashSet::new();
            for step in &job.steps {
                if !seen_steps.insert(&step.id) {
                    anyhow::bail!("Duplicate step ID '{}' in job '{}'", step.id, job.id);
                }
                if let StepActionConfig::Run(command) = &step.action {
                    if command.trim().is_empty() {
                        anyhow::bail!(
                            "Step '{}' in job '{}' has an empty command",
                            step.id,
                            job.id
                        );
                    }
                }
                if let Some(dir) = &step.working_directory {
                    check_relative_dir(dir)
                        .with_context(|| format!("Step '{}' in job '{}'", step.id, job.id))?;
                }
            }
        }

        for (key, value) in &self.env {
            if scalar_to_string(value).is_none() {
                anyhow::bail!("Environment variable '{}' must be a scalar value", key);
            }
        }

        // Compile patterns once here so `to_workflow` cannot fail on them later
        self.trigger_rules()?;

        Ok(())
    }

    /// Shared environment as string values
    pub fn environment(&self) -> SharedEnvironment {
        SharedEnvironment::new(
            self.env
                .iter()
                .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k.clone(), v))),
        )
    }

    /// Compile the declared triggers
    pub fn trigger_rules(&self) -> Result<TriggerRules> {
        Ok(TriggerRules {
            push: self.triggers.push.as_ref().map(compile_filter).transpose()?,
            pull_request: self
                .triggers
                .pull_request
                .as_ref()
                .map(compile_filter)
                .transpose()?,
            merge_group: self.triggers.merge_group.is_some(),
            workflow_dispatch: self.triggers.workflow_dispatch.is_some(),
        })
    }

    /// Convert config to a Workflow domain model
    pub fn to_workflow(&self) -> Result<Workflow> {
        Workflow::from_config(self)
    }
}

fn compile_filter(config: &FilterConfig) -> Result<EventFilter> {
    let compile = |items: &[String]| -> Result<Vec<Pattern>> {
        items
            .iter()
            .map(|s| {
                if s.trim().is_empty() {
                    anyhow::bail!("Invalid pattern: empty string");
                }
                Pattern::parse(s).with_context(|| format!("Invalid pattern '{}'", s))
            })
            .collect()
    };

    Ok(EventFilter {
        branches: compile(&config.branches)?,
        paths: compile(&config.paths)?,
    })
}

/// Job IDs name the job's workspace directory
fn is_single_component(id: &str) -> bool {
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == id
    )
}

/// Working directories must stay inside the job workspace
fn check_relative_dir(dir: &str) -> Result<()> {
    for component in Path::new(dir).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                anyhow::bail!("working directory '{}' must not contain '..'", dir)
            }
            Component::RootDir | Component::Prefix(_) => {
                anyhow::bail!("working directory '{}' must be relative", dir)
            }
        }
    }
    Ok(())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
