//! ci-gate - a path-gated CI pipeline runner for the horaedb metric engine

pub mod cli;
pub mod command;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use command::{CommandError, CommandExecutor, CommandOutput, Invocation, ShellExecutor};
pub use core::{
    Event, EventKind, ExecutionStatus, JobDefinition, JobRun, JobState, PipelineRun,
    SharedEnvironment, Step, TriggerRules, Workflow,
};
pub use execution::{CompletionPolicy, ExecutionEngine, ExecutionEvent, SetupError};
