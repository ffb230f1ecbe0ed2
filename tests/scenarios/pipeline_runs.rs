//! End-to-end runs of the built-in workflow against a scripted executor

use crate::helpers::*;
use ci_gate::core::{Event, EventKind, ExecutionStatus, JobState, SetupPhase, Workflow};
use ci_gate::execution::{CompletionPolicy, ExecutionEngine, ExecutionEvent};
use std::sync::Arc;
use std::time::Duration;

/// Push to main touching the metric engine runs both jobs and succeeds
#[tokio::test]
async fn test_push_to_main_runs_both_jobs() {
    let mock = Arc::new(MockExecutor::new());
    let run = dispatch_builtin(mock.clone(), push("main", &["horaedb/src/engine.rs"]))
        .await
        .expect("push to main touching horaedb/ must start a run");

    assert_eq!(run.status, ExecutionStatus::Succeeded);
    assert_eq!(run.jobs.len(), 2);
    assert_eq!(job_state(&run, "style-check"), &JobState::Succeeded);
    assert_eq!(job_state(&run, "unit-test"), &JobState::Succeeded);
    assert!(run.completed_at.is_some());

    assert!(mock.ran("style-check", "make fmt sort clippy"));
    assert!(mock.ran("unit-test", "make test"));
    assert!(!mock.ran("unit-test", "clippy"));
}

/// Setup phases run before the first step, in order, at the workspace root
#[tokio::test]
async fn test_setup_runs_before_steps() {
    let mock = Arc::new(MockExecutor::new());
    dispatch_builtin(mock.clone(), push("dev", &["horaedb/Cargo.toml"]))
        .await
        .unwrap();

    let commands = mock.commands_for("unit-test");
    let position = |needle: &str| {
        commands
            .iter()
            .position(|c| c.contains(needle))
            .unwrap_or_else(|| panic!("`{}` never ran: {:?}", needle, commands))
    };

    assert!(position("git fetch") < position("rustup toolchain install nightly-2024-01-28"));
    assert!(position("git submodule update --init --recursive") < position("rustup"));
    assert!(position("rustup") < position("make ensure-disk-quota"));
    assert!(position("make ensure-disk-quota") < position("protobuf-compiler"));
    assert!(position("protobuf-compiler") < position("make test"));
    assert!(position("make test") < position("git status --porcelain"));

    let setup_dirs: Vec<_> = mock
        .invocations()
        .into_iter()
        .filter(|inv| inv.command.contains("rustup toolchain install"))
        .map(|inv| inv.working_dir)
        .collect();
    assert_eq!(setup_dirs.len(), 2);
    for dir in setup_dirs {
        assert_ne!(dir.file_name().and_then(|n| n.to_str()), Some("horaedb"));
    }
}

/// Steps run in the job's default directory with the shared environment
#[tokio::test]
async fn test_steps_see_shared_environment() {
    let mock = Arc::new(MockExecutor::new());
    dispatch_builtin(mock.clone(), push("main", &["horaedb/src/engine.rs"]))
        .await
        .unwrap();

    let test_step = mock
        .invocations()
        .into_iter()
        .find(|inv| inv.command == "make test")
        .unwrap();
    assert!(test_step.working_dir.ends_with("unit-test/horaedb"));
    assert_eq!(test_step.env.get("RUST_BACKTRACE").map(String::as_str), Some("1"));
    assert_eq!(test_step.env.get("LOCK_FILE").map(String::as_str), Some("Cargo.lock"));
    assert_eq!(
        test_step.env.get("RUST_VERSION").map(String::as_str),
        Some("nightly-2024-01-28")
    );
}

/// A lint failure fails the pipeline even though Unit-Test succeeds
///
/// Setup is step 1 and tool installation step 2, so lint is step 3.
#[tokio::test]
async fn test_lint_failure_fails_pipeline() {
    let mock = Arc::new(MockExecutor::new().fail("make fmt sort clippy", 2));
    let run = dispatch_builtin(mock.clone(), push("main", &["horaedb/src/engine.rs"]))
        .await
        .unwrap();

    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_failed_at(&run, "style-check", 3, "style");
    assert_eq!(job_state(&run, "style-check").label(), "failed-at-step-3");
    assert_eq!(job_state(&run, "unit-test"), &JobState::Succeeded);

    // The clean-tree check after the failed step never ran
    assert!(!mock.ran("style-check", "git status"));
    assert!(mock.ran("unit-test", "git status"));
}

/// Drift after passing tests fails the last step of Unit-Test
#[tokio::test]
async fn test_lock_file_drift_fails_last_step() {
    let mock = Arc::new(MockExecutor::new().on_job(
        "unit-test",
        "git status --porcelain",
        Reply::Stdout(" M Cargo.lock\n".to_string()),
    ));
    let run = dispatch_builtin(mock.clone(), pull_request(&["horaedb/metric_engine/src/lib.rs"]))
        .await
        .unwrap();

    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_failed_at(&run, "unit-test", 3, "check-lock");
    assert_eq!(job_state(&run, "style-check"), &JobState::Succeeded);

    match job_state(&run, "unit-test") {
        JobState::FailedAtStep { error, .. } => {
            assert!(error.contains("M Cargo.lock"), "{}", error)
        }
        other => panic!("unexpected state {:?}", other),
    }
}

/// Manual dispatch with no changed paths runs both jobs
#[tokio::test]
async fn test_manual_dispatch_without_paths() {
    let mock = Arc::new(MockExecutor::new());
    let event = Event::new(EventKind::WorkflowDispatch).with_repository(REPOSITORY);
    let run = dispatch_builtin(mock.clone(), event).await.unwrap();

    assert!(run.is_success());
    assert!(mock.ran("style-check", "make fmt sort clippy"));
    assert!(mock.ran("unit-test", "make test"));
}

/// The pipeline succeeds only when every job does
#[tokio::test]
async fn test_pipeline_is_and_of_jobs() {
    let cases = [
        (None, ExecutionStatus::Succeeded),
        (Some("make fmt sort clippy"), ExecutionStatus::Failed),
        (Some("make test"), ExecutionStatus::Failed),
        (Some("rustup toolchain install"), ExecutionStatus::Failed),
    ];

    for (failing, expected) in cases {
        let mut mock = MockExecutor::new();
        if let Some(needle) = failing {
            mock = mock.fail(needle, 1);
        }
        let run = dispatch_builtin(Arc::new(mock), push("main", &["horaedb/src/engine.rs"]))
            .await
            .unwrap();
        assert_eq!(run.status, expected, "failing command: {:?}", failing);
        assert_eq!(
            run.is_success(),
            run.jobs.iter().all(|job| job.is_success())
        );
    }
}

/// A failing toolchain install is a setup failure, not a step failure
#[tokio::test]
async fn test_setup_failure_names_phase() {
    let mock = Arc::new(MockExecutor::new().fail("protobuf-compiler", 100));
    let run = dispatch_builtin(mock.clone(), push("main", &["horaedb/src/engine.rs"]))
        .await
        .unwrap();

    for job in ["style-check", "unit-test"] {
        match job_state(&run, job) {
            JobState::SetupFailed { phase, error } => {
                assert_eq!(*phase, SetupPhase::Packages);
                assert!(error.contains("exit code 100"), "{}", error);
            }
            other => panic!("{} expected setup failure, got {:?}", job, other),
        }
        assert_eq!(job_state(&run, job).label(), "failed-at-step-1");
    }
    assert!(!mock.ran("unit-test", "make test"));
}

/// Step events count the setup as position 1
#[tokio::test]
async fn test_step_events_follow_setup_position() {
    let mock = Arc::new(MockExecutor::new());
    let workflow = Workflow::builtin().unwrap();
    let event = push("main", &["horaedb/src/engine.rs"]);

    let (_, events) =
        execute_with_events(mock, &workflow, event, CompletionPolicy::WaitAll).await;

    let unit_steps: Vec<(usize, &str)> = events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepStarted {
                job_id,
                step,
                step_id,
            } if job_id == "unit-test" => Some((*step, step_id.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(unit_steps, vec![(2, "test"), (3, "check-lock")]);
}

/// The run's workspace is deleted after aggregation unless kept
#[tokio::test]
async fn test_run_workspace_cleanup() {
    let workflow = Workflow::builtin().unwrap();
    for keep in [false, true] {
        let root = temp_workspace();
        let engine = ExecutionEngine::new(Arc::new(MockExecutor::new()), root.clone())
            .with_keep_workspace(keep);
        let run = engine
            .execute(&workflow, push("main", &["horaedb/src/engine.rs"]))
            .await;

        let run_root = root.join(run.execution_id.to_string());
        assert_eq!(run_root.join("unit-test").is_dir(), keep, "keep = {}", keep);
        if !keep {
            assert!(!run_root.exists());
        }
    }
}

/// Fail-fast cancels the slower sibling once one job fails
#[tokio::test]
async fn test_fail_fast_aborts_sibling() {
    let mock = Arc::new(
        MockExecutor::new()
            .fail("make fmt sort clippy", 1)
            .on("make test", Reply::Delay(Duration::from_secs(30))),
    );
    let workflow = Workflow::builtin().unwrap();
    let event = push("main", &["horaedb/src/engine.rs"]);

    let started = std::time::Instant::now();
    let (run, events) =
        execute_with_events(mock, &workflow, event, CompletionPolicy::FailFast).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_failed_at(&run, "style-check", 3, "style");
    assert!(matches!(job_state(&run, "unit-test"), JobState::Aborted { .. }));

    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::PipelineCompleted {
            status: ExecutionStatus::Failed,
            ..
        })
    ));
}

/// Wait-all lets the other job finish after a failure
#[tokio::test]
async fn test_wait_all_finishes_sibling() {
    let mock = Arc::new(
        MockExecutor::new()
            .fail("make fmt sort clippy", 1)
            .on("make test", Reply::Delay(Duration::from_millis(200))),
    );
    let workflow = Workflow::builtin().unwrap();
    let event = push("main", &["horaedb/src/engine.rs"]);

    let (run, events) =
        execute_with_events(mock, &workflow, event, CompletionPolicy::WaitAll).await;

    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_eq!(job_state(&run, "unit-test"), &JobState::Succeeded);

    let finished: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::JobFinished { job_id, .. } => Some(job_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(finished.len(), 2);
    assert!(matches!(events.first(), Some(ExecutionEvent::PipelineStarted { jobs: 2, .. })));
}
