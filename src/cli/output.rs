//! CLI output formatting

use crate::{
    core::{ExecutionStatus, JobState, PipelineRun, TriggerDecision},
    execution::ExecutionEvent,
    persistence::{describe_failure, ExecutionSummary},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "* ");

/// Spinner shown while jobs are running
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        spinner.set_style(template);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Horizontal rule spanning the terminal width
pub fn rule() -> String {
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(80);
    style("─".repeat(width)).dim().to_string()
}

/// Format a pipeline status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a job state for display
pub fn format_job_state(state: &JobState) -> String {
    let label = state.label().to_uppercase();
    match state {
        JobState::Pending => style(label).dim().to_string(),
        JobState::Initializing { .. } | JobState::Running { .. } => {
            style(label).yellow().to_string()
        }
        JobState::Succeeded => style(label).green().to_string(),
        JobState::Aborted { .. } => style(label).yellow().to_string(),
        _ => style(label).red().to_string(),
    }
}

/// Format a trigger decision
pub fn format_decision(workflow_name: &str, decision: &TriggerDecision) -> String {
    if decision.matched {
        format!(
            "{} {} would run: {}",
            CHECK,
            style(workflow_name).bold(),
            decision.reason
        )
    } else {
        format!(
            "{} {} would not run: {}",
            INFO,
            style(workflow_name).bold(),
            style(&decision.reason).dim()
        )
    }
}

/// Per-job outcome lines for a finished run
pub fn format_run_report(run: &PipelineRun) -> Vec<String> {
    run.jobs
        .iter()
        .map(|job| {
            let icon = if job.is_success() { CHECK } else { CROSS };
            let detail = if job.is_success() {
                String::new()
            } else {
                format!(" {}", style(describe_failure(&job.job_id, &job.state)).dim())
            };
            format!(
                "  {}{} {}{}",
                icon,
                style(&job.job_name).bold(),
                format_job_state(&job.state),
                detail
            )
        })
        .collect()
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Succeeded => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };

    let mut line = format!(
        "{} {} - {} - {} [{}] ({}/{} jobs) - {}",
        status_icon,
        style(&summary.execution_id.to_string()[..8]).dim(),
        style(&summary.workflow_name).bold(),
        format_status(summary.status),
        summary.event_kind,
        summary.succeeded_jobs,
        summary.total_jobs,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    );
    if let Some(failure) = &summary.failure {
        line.push_str(&format!("\n      {}", style(failure).red()));
    }
    line
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineSkipped {
            workflow_name,
            reason,
        } => format!(
            "{} {} skipped: {}",
            INFO,
            style(workflow_name).bold(),
            style(reason).dim()
        ),
        ExecutionEvent::PipelineStarted {
            execution_id,
            workflow_name,
            event_kind,
            jobs,
        } => format!(
            "{} Starting {} for {} with {} jobs ({})",
            ROCKET,
            style(workflow_name).bold(),
            style(event_kind).cyan(),
            jobs,
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::JobStarted { job_id } => {
            format!("{} {}", SPINNER, style(job_id).cyan())
        }
        ExecutionEvent::SetupPhaseStarted { job_id, phase } => format!(
            "{} {} setup: {}",
            GEAR,
            style(job_id).dim(),
            phase
        ),
        ExecutionEvent::StepStarted {
            job_id,
            step,
            step_id,
        } => format!(
            "{} {} [{}] {}",
            SPINNER,
            style(job_id).dim(),
            step,
            style(step_id).cyan()
        ),
        ExecutionEvent::StepFinished {
            job_id,
            step,
            step_id,
            success,
        } => {
            if *success {
                format!("{} {} [{}] {}", CHECK, style(job_id).dim(), step, style(step_id).green())
            } else {
                format!("{} {} [{}] {}", CROSS, style(job_id).dim(), step, style(step_id).red())
            }
        }
        ExecutionEvent::JobFinished { job_id, state } => {
            let icon = if state.is_success() { CHECK } else { CROSS };
            format!("{} {} {}", icon, style(job_id).bold(), format_job_state(state))
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => format!(
            "{} Pipeline ({}) {}",
            INFO,
            style(&execution_id.to_string()[..8]).dim(),
            format_status(*status)
        ),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
