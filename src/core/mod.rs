//! Core domain models for the CI gate
//!
//! This module defines the fundamental data structures that represent
//! workflows, trigger rules, jobs, steps, and their run state.

pub mod config;
pub mod environment;
pub mod job;
pub mod pattern;
pub mod pipeline;
pub mod state;
pub mod trigger;

pub use environment::*;
pub use job::*;
pub use pipeline::*;
pub use state::*;
pub use trigger::*;
