//! Command execution for setup phases and job steps

pub mod response;
pub mod subprocess;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use response::{CommandError, CommandOutput};
pub use subprocess::ShellExecutor;

/// One command line to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Shell command line
    pub command: String,

    /// Directory the command runs in
    pub working_dir: PathBuf,

    /// Extra environment variables
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// Trait for command execution - allows for different implementations
///
/// A failing exit status is reported as `Ok` with a non-success
/// [`CommandOutput`]; `Err` is reserved for commands that could not run.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError>;
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for std::sync::Arc<T> {
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        (**self).execute(invocation).await
    }
}
