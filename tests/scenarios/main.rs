//! Scenario-based tests for ci-gate


mod job_runner;
mod pipeline_runs;
mod triggers;
