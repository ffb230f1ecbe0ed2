//! Pipeline execution: setup, job runner and coordinator

pub mod engine;
pub mod events;
pub mod executor;
pub mod initializer;

pub use engine::{CompletionPolicy, ExecutionEngine};
pub use events::{EventBus, EventHandler, ExecutionEvent};
pub use executor::{CancelSignal, JobContext, JobExecutor, StepResult};
pub use initializer::{EnvironmentInitializer, SetupAction, SetupError};
