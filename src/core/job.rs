//! Job and step domain model

use crate::core::{
    config::{JobConfig, SetupConfig, StepConfig},
    environment::SharedEnvironment,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default job timeout when the workflow does not declare one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// A named, ordered sequence of steps run in one private workspace
#[derive(Debug, Clone)]
pub struct JobDefinition {
    /// Unique job identifier
    pub id: String,

    /// Human-readable job name
    pub name: String,

    /// Default working directory, relative to the workspace root
    pub working_directory: Option<String>,

    /// Limit for the whole job, setup included
    pub timeout: Duration,

    /// Environment preparation done before the first step
    pub setup: SetupSpec,

    /// Steps in declared order
    pub steps: Vec<Step>,
}

/// A single step in a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Step identifier, unique within the job
    pub id: String,

    /// Human-readable step name
    pub name: String,

    /// What the step does
    pub action: StepAction,

    /// Overrides the job working directory
    pub working_directory: Option<String>,
}

/// What a step executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Shell command line, may contain `{{ NAME }}` placeholders
    Run(String),

    /// Fail if tracked files differ from the checked-in state
    VerifyClean { paths: Vec<String> },
}

/// Environment Initializer parameters for one job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupSpec {
    pub checkout: Option<CheckoutSpec>,

    /// Toolchain version template, usually `{{ RUST_VERSION }}`
    pub toolchain: Option<String>,

    /// Command enforcing the disk quota, run at the repository root
    pub disk_quota: Option<String>,

    /// System packages to install
    pub packages: Vec<String>,

    /// Command prefix used to install `packages`
    pub package_installer: String,
}

/// Source fetch options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutSpec {
    pub submodules: bool,
    pub depth: Option<u32>,
}

pub const DEFAULT_PACKAGE_INSTALLER: &str = "sudo apt-get install --yes";

impl SetupSpec {
    pub fn from_config(config: &SetupConfig) -> Self {
        Self {
            checkout: config.checkout.as_ref().map(|c| CheckoutSpec {
                submodules: c.submodules,
                depth: c.depth,
            }),
            toolchain: config.toolchain.clone(),
            disk_quota: config.disk_quota.clone(),
            packages: config.packages.clone(),
            package_installer: config
                .package_installer
                .clone()
                .unwrap_or_else(|| DEFAULT_PACKAGE_INSTALLER.to_string()),
        }
    }

    /// Whether any setup phase is declared
    pub fn is_empty(&self) -> bool {
        self.checkout.is_none()
            && self.toolchain.is_none()
            && self.disk_quota.is_none()
            && self.packages.is_empty()
    }
}

impl Step {
    pub fn from_config(config: &StepConfig) -> Self {
        Step {
            id: config.id.clone(),
            name: config.name.clone().unwrap_or_else(|| config.id.clone()),
            action: config.action.clone().into(),
            working_directory: config.working_directory.clone(),
        }
    }

    /// Convenience constructor for a command step
    pub fn run(id: &str, command: &str) -> Self {
        Step {
            id: id.to_string(),
            name: id.to_string(),
            action: StepAction::Run(command.to_string()),
            working_directory: None,
        }
    }

    /// Convenience constructor for a clean-tree verification step
    pub fn verify_clean(id: &str) -> Self {
        Step {
            id: id.to_string(),
            name: id.to_string(),
            action: StepAction::VerifyClean { paths: vec![] },
            working_directory: None,
        }
    }

    pub fn in_directory(mut self, dir: &str) -> Self {
        self.working_directory = Some(dir.to_string());
        self
    }

    /// The command line this step runs, with placeholders rendered
    pub fn render_command(&self, env: &SharedEnvironment) -> String {
        match &self.action {
            StepAction::Run(command) => env.render(command),
            StepAction::VerifyClean { paths } => {
                let mut command = String::from("git status --porcelain --untracked-files=no");
                if !paths.is_empty() {
                    command.push_str(" --");
                    for path in paths {
                        command.push(' ');
                        command.push_str(&env.render(path));
                    }
                }
                command
            }
        }
    }
}

impl JobDefinition {
    pub fn from_config(config: &JobConfig) -> Self {
        let timeout = config
            .timeout_minutes
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or(DEFAULT_TIMEOUT);

        JobDefinition {
            id: config.id.clone(),
            name: config.name.clone().unwrap_or_else(|| config.id.clone()),
            working_directory: config.working_directory.clone(),
            timeout,
            setup: config
                .setup
                .as_ref()
                .map(SetupSpec::from_config)
                .unwrap_or_default(),
            steps: config.steps.iter().map(Step::from_config).collect(),
        }
    }

    /// Build a job directly, mainly for tests and embedding
    pub fn new(id: &str, steps: Vec<Step>) -> Self {
        JobDefinition {
            id: id.to_string(),
            name: id.to_string(),
            working_directory: None,
            timeout: DEFAULT_TIMEOUT,
            setup: SetupSpec::default(),
            steps,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_working_directory(mut self, dir: &str) -> Self {
        self.working_directory = Some(dir.to_string());
        self
    }

    pub fn with_setup(mut self, setup: SetupSpec) -> Self {
        self.setup = setup;
        self
    }

    /// Reported position of the first declared step
    ///
    /// Positions are 1-indexed; a declared setup runs as position 1.
    pub fn first_step_position(&self) -> usize {
        if self.setup.is_empty() {
            1
        } else {
            2
        }
    }

    /// Resolve the directory a step runs in
    pub fn step_directory(&self, workspace: &Path, step: &Step) -> PathBuf {
        match step
            .working_directory
            .as_deref()
            .or(self.working_directory.as_deref())
        {
            Some(dir) => workspace.join(dir),
            None => workspace.to_path_buf(),
        }
    }
}
