//! Environment Initializer - prepares a job workspace before its steps run

use crate::{
    command::{CommandExecutor, Invocation},
    core::{CheckoutSpec, Event, SetupPhase, SetupSpec, SharedEnvironment},
};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Error types for environment setup
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("source fetch failed: {0}")]
    SourceFetch(String),

    #[error("toolchain install failed: {0}")]
    ToolchainInstall(String),

    #[error("disk quota could not be enforced: {0}")]
    Quota(String),

    #[error("package install failed: {0}")]
    PackageInstall(String),
}

impl SetupError {
    fn for_phase(phase: SetupPhase, message: String) -> Self {
        match phase {
            SetupPhase::Checkout => SetupError::SourceFetch(message),
            SetupPhase::Toolchain => SetupError::ToolchainInstall(message),
            SetupPhase::DiskQuota => SetupError::Quota(message),
            SetupPhase::Packages => SetupError::PackageInstall(message),
        }
    }

    pub fn phase(&self) -> SetupPhase {
        match self {
            SetupError::SourceFetch(_) => SetupPhase::Checkout,
            SetupError::ToolchainInstall(_) => SetupPhase::Toolchain,
            SetupError::Quota(_) => SetupPhase::DiskQuota,
            SetupError::PackageInstall(_) => SetupPhase::Packages,
        }
    }
}

/// Commands for one setup phase, run in order at the workspace root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupAction {
    pub phase: SetupPhase,
    pub commands: Vec<String>,
}

/// Plans and runs the setup phases declared for a job
pub struct EnvironmentInitializer<'a> {
    setup: &'a SetupSpec,
    env: &'a SharedEnvironment,
    event: &'a Event,
}

impl<'a> EnvironmentInitializer<'a> {
    pub fn new(setup: &'a SetupSpec, env: &'a SharedEnvironment, event: &'a Event) -> Self {
        Self { setup, env, event }
    }

    /// Resolve the declared phases into command lines
    ///
    /// Phases run in a fixed order: checkout, toolchain, disk quota,
    /// packages. Undeclared phases are left out.
    pub fn plan(&self) -> Result<Vec<SetupAction>, SetupError> {
        let mut actions = Vec::new();

        if let Some(checkout) = &self.setup.checkout {
            actions.push(SetupAction {
                phase: SetupPhase::Checkout,
                commands: self.checkout_commands(checkout)?,
            });
        }

        if let Some(toolchain) = &self.setup.toolchain {
            let version = self.env.render(toolchain);
            if version.trim().is_empty() || version.contains("{{") {
                return Err(SetupError::ToolchainInstall(format!(
                    "toolchain version '{}' is not resolved",
                    version
                )));
            }
            actions.push(SetupAction {
                phase: SetupPhase::Toolchain,
                commands: vec![
                    "rustup set auto-self-update disable".to_string(),
                    format!(
                        "rustup toolchain install {} --profile minimal",
                        shell_quote(&version)
                    ),
                ],
            });
        }

        if let Some(quota) = &self.setup.disk_quota {
            actions.push(SetupAction {
                phase: SetupPhase::DiskQuota,
                commands: vec![self.env.render(quota)],
            });
        }

        if !self.setup.packages.is_empty() {
            let packages: Vec<String> =
                self.setup.packages.iter().map(|p| shell_quote(p)).collect();
            actions.push(SetupAction {
                phase: SetupPhase::Packages,
                commands: vec![format!(
                    "{} {}",
                    self.setup.package_installer,
                    packages.join(" ")
                )],
            });
        }

        Ok(actions)
    }

    fn checkout_commands(&self, checkout: &CheckoutSpec) -> Result<Vec<String>, SetupError> {
        let repository = self.event.repository.as_deref().ok_or_else(|| {
            SetupError::SourceFetch("event does not name a repository to fetch".to_string())
        })?;
        let depth = checkout
            .depth
            .map(|d| format!(" --depth {}", d))
            .unwrap_or_default();
        let reference = self.event.commit.as_deref().unwrap_or("HEAD");

        let mut commands = vec![
            "git init --quiet .".to_string(),
            format!("git remote add origin {}", shell_quote(repository)),
            format!("git fetch --quiet{} origin {}", depth, shell_quote(reference)),
            "git checkout --quiet --detach FETCH_HEAD".to_string(),
        ];
        if checkout.submodules {
            commands.push(format!("git submodule update --init --recursive{}", depth));
        }
        Ok(commands)
    }

    /// Run one planned phase; the first failing command aborts it
    pub async fn run_phase<E>(
        &self,
        executor: &E,
        action: &SetupAction,
        workspace: &Path,
    ) -> Result<(), SetupError>
    where
        E: CommandExecutor + ?Sized,
    {
        info!("Setup phase: {}", action.phase);

        for command in &action.commands {
            debug!("[{}] {}", action.phase, command);
            let invocation = Invocation::new(command.as_str(), workspace).with_env(self.env.iter());

            let output = executor
                .execute(&invocation)
                .await
                .map_err(|e| SetupError::for_phase(action.phase, e.to_string()))?;

            if !output.is_success() {
                return Err(SetupError::for_phase(
                    action.phase,
                    format!("`{}` failed with {}", command, output.describe_failure()),
                ));
            }
        }

        Ok(())
    }
}

/// Quote a value for `sh -c`
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@=+,".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
