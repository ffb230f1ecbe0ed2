//! Job runner behavior: ordering, short-circuit, timeouts, setup errors

use crate::helpers::*;
use ci_gate::core::config::WorkflowConfig;
use ci_gate::core::{
    Event, EventKind, JobDefinition, JobState, SetupPhase, SetupSpec, SharedEnvironment, Step,
    TriggerRules, Workflow,
};
use ci_gate::execution::CompletionPolicy;
use std::sync::Arc;
use std::time::Duration;

const FOUR_STEPS: &str = r#"
name: "Four Steps"
on:
  workflow_dispatch: {}
jobs:
  - id: "build"
    steps:
      - id: "one"
        run: "echo step-1"
      - id: "two"
        run: "echo step-2"
      - id: "three"
        run: "echo step-3"
      - id: "four"
        run: "echo step-4"
"#;

fn manual() -> Event {
    Event::new(EventKind::WorkflowDispatch)
}

fn workflow_of(jobs: Vec<JobDefinition>) -> Workflow {
    Workflow {
        name: "adhoc".to_string(),
        triggers: TriggerRules::default(),
        environment: Arc::new(SharedEnvironment::default()),
        jobs,
    }
}

/// If step k fails, steps after k never run and the outcome names step k
#[tokio::test]
async fn test_failure_at_step_k_short_circuits() {
    let workflow = WorkflowConfig::from_yaml(FOUR_STEPS)
        .unwrap()
        .to_workflow()
        .unwrap();

    for k in 1..=4 {
        let mock = Arc::new(MockExecutor::new().fail(&format!("step-{}", k), 1));
        let run = engine(mock.clone()).execute(&workflow, manual()).await;

        let step_id = ["one", "two", "three", "four"][k - 1];
        assert_failed_at(&run, "build", k, step_id);

        let commands = mock.commands_for("build");
        assert_eq!(commands.len(), k, "k = {}: {:?}", k, commands);
        for (i, command) in commands.iter().enumerate() {
            assert_eq!(command, &format!("echo step-{}", i + 1));
        }
    }
}

#[tokio::test]
async fn test_all_steps_succeed_in_order() {
    let workflow = WorkflowConfig::from_yaml(FOUR_STEPS)
        .unwrap()
        .to_workflow()
        .unwrap();
    let mock = Arc::new(MockExecutor::new());
    let run = engine(mock.clone()).execute(&workflow, manual()).await;

    assert!(run.is_success());
    assert_eq!(
        mock.commands_for("build"),
        vec!["echo step-1", "echo step-2", "echo step-3", "echo step-4"]
    );
}

/// A job over its limit times out at the running step
#[tokio::test]
async fn test_timeout_cuts_off_running_step() {
    let job = JobDefinition::new(
        "slow",
        vec![
            Step::run("prepare", "true"),
            Step::run("hang", "sleep 600"),
            Step::run("never", "true"),
        ],
    )
    .with_timeout(Duration::from_millis(200));
    let mock = Arc::new(MockExecutor::new().on("sleep 600", Reply::Delay(Duration::from_secs(60))));

    let started = std::time::Instant::now();
    let run = engine(mock.clone()).execute(&workflow_of(vec![job]), manual()).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(matches!(
        job_state(&run, "slow"),
        JobState::TimedOut { step: Some(2), .. }
    ));
    assert!(!run.is_success());
    assert_eq!(mock.commands_for("slow").len(), 2);
}

/// The timeout only affects the job that exceeded it
#[tokio::test]
async fn test_timeout_is_per_job() {
    let slow = JobDefinition::new("slow", vec![Step::run("hang", "sleep 600")])
        .with_timeout(Duration::from_millis(100));
    let fast = JobDefinition::new("fast", vec![Step::run("work", "sleep 1")]);
    let mock = Arc::new(
        MockExecutor::new()
            .on("sleep 600", Reply::Delay(Duration::from_secs(60)))
            .on("sleep 1", Reply::Delay(Duration::from_millis(300))),
    );

    let (run, _) = execute_with_events(
        mock,
        &workflow_of(vec![slow, fast]),
        manual(),
        CompletionPolicy::WaitAll,
    )
    .await;

    assert!(matches!(job_state(&run, "slow"), JobState::TimedOut { .. }));
    assert_eq!(job_state(&run, "fast"), &JobState::Succeeded);
}

/// A command that cannot be spawned fails its step
#[tokio::test]
async fn test_spawn_error_fails_step() {
    let job = JobDefinition::new("build", vec![Step::run("compile", "missing-tool --all")]);
    let mock = Arc::new(MockExecutor::new().on("missing-tool", Reply::SpawnError));
    let run = engine(mock).execute(&workflow_of(vec![job]), manual()).await;

    assert_failed_at(&run, "build", 1, "compile");
}

/// Clean-tree verification can be restricted to paths and reports drifted files
#[tokio::test]
async fn test_verify_clean_with_paths() {
    let config = WorkflowConfig::from_yaml(
        r#"
name: "Lock Check"
env:
  LOCK_FILE: "Cargo.lock"
jobs:
  - id: "lock"
    steps:
      - id: "check-lock"
        verify_clean:
          paths: ["{{ LOCK_FILE }}", "rust-toolchain.toml"]
"#,
    )
    .unwrap();
    let workflow = config.to_workflow().unwrap();
    let mock = Arc::new(MockExecutor::new().on(
        "git status",
        Reply::Stdout(" M Cargo.lock\n M rust-toolchain.toml\n".to_string()),
    ));

    let run = engine(mock.clone()).execute(&workflow, manual()).await;

    assert_eq!(
        mock.commands_for("lock"),
        vec!["git status --porcelain --untracked-files=no -- Cargo.lock rust-toolchain.toml"]
    );
    match job_state(&run, "lock") {
        JobState::FailedAtStep { step, error, .. } => {
            assert_eq!(*step, 1);
            assert_eq!(error, "uncommitted changes: M Cargo.lock, M rust-toolchain.toml");
        }
        other => panic!("unexpected state {:?}", other),
    }
}

/// Step working directory overrides the job default
#[tokio::test]
async fn test_step_directory_override() {
    let job = JobDefinition::new(
        "docs",
        vec![
            Step::run("engine", "make check"),
            Step::run("site", "make site").in_directory("docs"),
        ],
    )
    .with_working_directory("horaedb");
    let mock = Arc::new(MockExecutor::new());
    engine(mock.clone()).execute(&workflow_of(vec![job]), manual()).await;

    let dirs: Vec<_> = mock.invocations().into_iter().map(|inv| inv.working_dir).collect();
    assert!(dirs[0].ends_with("docs/horaedb"));
    assert!(dirs[1].ends_with("docs/docs"));
}

/// Checkout needs a repository on the event
#[tokio::test]
async fn test_checkout_without_repository_is_setup_failure() {
    let job = JobDefinition::new("build", vec![Step::run("compile", "make")]).with_setup(
        SetupSpec {
            checkout: Some(Default::default()),
            ..Default::default()
        },
    );
    let mock = Arc::new(MockExecutor::new());
    let run = engine(mock.clone()).execute(&workflow_of(vec![job]), manual()).await;

    assert!(matches!(
        job_state(&run, "build"),
        JobState::SetupFailed {
            phase: SetupPhase::Checkout,
            ..
        }
    ));
    assert_eq!(mock.call_count(), 0);
}

/// Each setup phase maps its failure to that phase
#[tokio::test]
async fn test_setup_failure_per_phase() {
    let cases = [
        ("git fetch", SetupPhase::Checkout),
        ("rustup toolchain install", SetupPhase::Toolchain),
        ("ensure-disk-quota", SetupPhase::DiskQuota),
        ("apt-get install", SetupPhase::Packages),
    ];

    for (needle, expected) in cases {
        let mock = Arc::new(MockExecutor::new().fail(needle, 1));
        let run = dispatch_builtin(mock.clone(), push("main", &["horaedb/src/engine.rs"]))
            .await
            .unwrap();

        match job_state(&run, "unit-test") {
            JobState::SetupFailed { phase, .. } => assert_eq!(*phase, expected, "{}", needle),
            other => panic!("{}: expected setup failure, got {:?}", needle, other),
        }
        assert!(!mock.ran("unit-test", "make test"), "{}", needle);
    }
}

/// A declared setup is position 1 and pushes the steps after it
#[tokio::test]
async fn test_setup_shifts_step_positions() {
    let job = JobDefinition::new(
        "build",
        vec![Step::run("compile", "make build"), Step::run("test", "make test")],
    )
    .with_setup(SetupSpec {
        disk_quota: Some("make ensure-disk-quota".to_string()),
        ..Default::default()
    });
    let mock = Arc::new(MockExecutor::new().fail("make test", 1));
    let run = engine(mock).execute(&workflow_of(vec![job]), manual()).await;

    assert_failed_at(&run, "build", 3, "test");
}

/// Running out of time during setup reports position 1
#[tokio::test]
async fn test_timeout_during_setup_is_step_one() {
    let job = JobDefinition::new("build", vec![Step::run("compile", "make build")])
        .with_setup(SetupSpec {
            disk_quota: Some("make ensure-disk-quota".to_string()),
            ..Default::default()
        })
        .with_timeout(Duration::from_millis(150));
    let mock = Arc::new(
        MockExecutor::new().on("ensure-disk-quota", Reply::Delay(Duration::from_secs(60))),
    );
    let run = engine(mock.clone()).execute(&workflow_of(vec![job]), manual()).await;

    assert_eq!(
        job_state(&run, "build"),
        &JobState::TimedOut {
            step: Some(1),
            limit_ms: 150
        }
    );
    assert!(!mock.ran("build", "make build"));
}
