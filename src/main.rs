use anyhow::{Context, Result};
use ci_gate::cli::commands::{
    CheckCommand, HistoryCommand, ListCommand, RunCommand, ValidateCommand,
};
use ci_gate::cli::output::*;
use ci_gate::cli::{Cli, Command};
use ci_gate::core::config::WorkflowConfig;
use ci_gate::core::{StepAction, Workflow};
use ci_gate::execution::{CompletionPolicy, ExecutionEngine};
use ci_gate::persistence::{
    create_summary, ExecutionSummary, InMemoryPersistence, PersistenceBackend,
    SqliteExecutionStore,
};
use ci_gate::ShellExecutor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Failed to set logging subscriber")?;

    let file = cli.file.as_deref();
    match &cli.command {
        Command::Run(cmd) => run_workflow(&load_config(file)?, cmd).await?,
        Command::Check(cmd) => check_event(&load_config(file)?, cmd)?,
        Command::Validate(cmd) => validate_workflow(file, cmd)?,
        Command::List(cmd) => list_jobs(&load_config(file)?, cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

fn load_config(file: Option<&str>) -> Result<WorkflowConfig> {
    match file {
        Some(path) => WorkflowConfig::from_file(path)
            .with_context(|| format!("Failed to load workflow {}", path)),
        None => WorkflowConfig::builtin(),
    }
}

async fn run_workflow(config: &WorkflowConfig, cmd: &RunCommand) -> Result<()> {
    let workflow = config.to_workflow()?;
    let environment = workflow.environment.with_overrides(&cmd.env);
    let workflow = workflow.with_environment(environment);

    for (key, value) in &cmd.env {
        println!(
            "{} Environment override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let mut event = cmd.event.to_event()?;
    if event.repository.is_none() {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        event.repository = Some(cwd.to_string_lossy().into_owned());
    }

    let workspace_root = cmd
        .workspace
        .clone()
        .unwrap_or_else(default_workspace);
    let policy = if cmd.fail_fast {
        CompletionPolicy::FailFast
    } else {
        CompletionPolicy::WaitAll
    };

    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        Arc::new(SqliteExecutionStore::with_default_path().await?)
    };

    let engine = ExecutionEngine::new(Arc::new(ShellExecutor::default()), workspace_root)
        .with_policy(policy)
        .with_keep_workspace(cmd.keep_workspace);

    let spinner = create_spinner(&format!("Running {}", workflow.name));
    let printer = spinner.clone();
    engine
        .add_event_handler(move |event| printer.println(format_execution_event(&event)))
        .await;

    let run = engine.dispatch(&workflow, event).await;
    spinner.finish_and_clear();

    let Some(run) = run else {
        return Ok(());
    };

    println!("{}", rule());
    for line in format_run_report(&run) {
        println!("{}", line);
    }
    if let (Some(started), Some(completed)) = (run.started_at, run.completed_at) {
        if let Ok(duration) = completed.signed_duration_since(started).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }

    if !cmd.no_history {
        let summary = create_summary(&run);
        match store.save_execution(&summary).await {
            Ok(()) => println!(
                "\n{} Execution saved to history (ID: {})",
                INFO,
                style(&summary.execution_id.to_string()[..8]).dim()
            ),
            Err(e) => warn!("Failed to save execution history: {:#}", e),
        }
    }

    if run.is_success() {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(&run.workflow_name).bold(),
            style("successfully").green()
        );
    } else {
        println!(
            "\n{} {} {}",
            CROSS,
            style(&run.workflow_name).bold(),
            style("failed").red()
        );
        for job in run.failed_jobs() {
            error!("{} did not succeed: {}", job.job_id, job.state.label());
        }
        std::process::exit(1);
    }

    Ok(())
}

fn check_event(config: &WorkflowConfig, cmd: &CheckCommand) -> Result<()> {
    let workflow = config.to_workflow()?;
    let event = cmd.event.to_event()?;
    let decision = workflow.evaluate(&event);

    if cmd.json {
        let data = serde_json::json!({
            "workflow": workflow.name,
            "event": event,
            "decision": decision,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{}", format_decision(&workflow.name, &decision));
    }

    Ok(())
}

fn validate_workflow(file: Option<&str>, cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating workflow...", INFO);

    let result = load_config(file).and_then(|config| Ok((config.to_workflow()?, config)));

    match result {
        Ok((workflow, config)) => {
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&workflow.name).bold());
            println!("  Jobs: {}", style(workflow.jobs.len()).cyan());
            println!("  Environment: {}", style(workflow.environment.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn list_jobs(config: &WorkflowConfig, cmd: &ListCommand) -> Result<()> {
    let workflow = config.to_workflow()?;
    print_jobs(&workflow, cmd.steps);
    Ok(())
}

fn print_jobs(workflow: &Workflow, with_steps: bool) {
    println!("{} {}", INFO, style(&workflow.name).bold());

    for job in &workflow.jobs {
        println!(
            "  {} {} (timeout {}, in {})",
            style(&job.id).cyan(),
            style(&job.name).bold(),
            format_duration(job.timeout),
            job.working_directory.as_deref().unwrap_or(".")
        );

        if with_steps {
            if !job.setup.is_empty() {
                let mut phases = Vec::new();
                if job.setup.checkout.is_some() {
                    phases.push("checkout".to_string());
                }
                if let Some(toolchain) = &job.setup.toolchain {
                    phases.push(format!("toolchain {}", workflow.environment.render(toolchain)));
                }
                if job.setup.disk_quota.is_some() {
                    phases.push("disk quota".to_string());
                }
                if !job.setup.packages.is_empty() {
                    phases.push(format!("packages {}", job.setup.packages.join(" ")));
                }
                println!(
                    "    1. {} {}",
                    style("setup").bold(),
                    style(phases.join(", ")).dim()
                );
            }
            let first = job.first_step_position();
            for (index, step) in job.steps.iter().enumerate() {
                let action = match &step.action {
                    StepAction::Run(command) => workflow.environment.render(command),
                    StepAction::VerifyClean { paths } if paths.is_empty() => {
                        "verify clean tree".to_string()
                    }
                    StepAction::VerifyClean { paths } => {
                        format!("verify clean: {}", paths.join(", "))
                    }
                };
                println!(
                    "    {}. {} {}",
                    first + index,
                    style(&step.id).bold(),
                    style(action).dim()
                );
            }
        }
    }
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = SqliteExecutionStore::with_default_path().await?;

    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id =
            uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;
        match store.load_execution(exec_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.json)?,
            None => println!("{} Execution not found", WARN),
        }
        return Ok(());
    }

    let mut executions = match &cmd.workflow {
        Some(workflow_name) => store.list_executions(workflow_name).await?,
        None => {
            let mut all_execs = Vec::new();
            for workflow_name in store.list_workflows().await? {
                all_execs.extend(store.list_executions(&workflow_name).await?);
            }
            all_execs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all_execs
        }
    };
    executions.truncate(cmd.limit);

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Execution history (showing latest {}):", INFO, cmd.limit);
        for summary in &executions {
            println!("  {}", format_execution_summary(summary));
        }
    }

    Ok(())
}

fn print_execution_details(summary: &ExecutionSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow_name).bold());
    println!("  Event: {}", summary.event_kind);
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Jobs: {}/{} succeeded",
        summary.succeeded_jobs, summary.total_jobs
    );
    if let Some(failure) = &summary.failure {
        println!("  Failure: {}", style(failure).red());
    }

    Ok(())
}

fn default_workspace() -> PathBuf {
    std::env::temp_dir().join("ci-gate")
}
