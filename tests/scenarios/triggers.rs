//! Trigger gating on the built-in workflow

use crate::helpers::*;
use ci_gate::core::{Event, EventKind, Workflow};
use std::sync::Arc;

#[test]
fn test_manual_and_merge_group_always_match() {
    let workflow = Workflow::builtin().unwrap();

    for kind in [EventKind::WorkflowDispatch, EventKind::MergeGroup] {
        for event in [
            Event::new(kind),
            Event::new(kind).with_branch("feature-x"),
            Event::new(kind).with_paths(&["docs/index.md"]),
        ] {
            assert!(workflow.evaluate(&event).matched, "{:?} should match", event);
        }
    }
}

#[test]
fn test_push_outside_main_and_dev_never_matches() {
    let workflow = Workflow::builtin().unwrap();

    for branch in ["feature-x", "release/1.0", "mainline", "Main"] {
        let event = Event::push(branch, &["horaedb/src/engine.rs"]);
        assert!(!workflow.evaluate(&event).matched, "branch {} matched", branch);
    }
    for branch in ["main", "dev"] {
        let event = Event::push(branch, &["horaedb/src/engine.rs"]);
        assert!(workflow.evaluate(&event).matched, "branch {} did not match", branch);
    }
}

#[test]
fn test_push_to_main_needs_a_matching_path() {
    let workflow = Workflow::builtin().unwrap();

    assert!(!workflow.evaluate(&Event::push("main", &["docs/readme.md"])).matched);
    assert!(!workflow.evaluate(&Event::push("main", &[])).matched);
}

#[test]
fn test_pull_request_matches_iff_a_path_is_under_the_prefix() {
    let workflow = Workflow::builtin().unwrap();

    let cases: &[(&[&str], bool)] = &[
        (&["horaedb/Cargo.lock"], true),
        (&["README.md", "horaedb/src/lib.rs"], true),
        (&["horaedb"], false),
        (&["horaedb-docs/guide.md"], false),
        (&["src/horaedb/main.rs"], false),
        (&[], false),
    ];

    for (paths, expected) in cases {
        let decision = workflow.evaluate(&Event::pull_request(paths));
        assert_eq!(decision.matched, *expected, "paths {:?}: {}", paths, decision.reason);
    }
}

/// Push to a feature branch creates no pipeline run
#[tokio::test]
async fn test_unmatched_event_runs_nothing() {
    let mock = Arc::new(MockExecutor::new());
    let run = dispatch_builtin(mock.clone(), push("feature-x", &["horaedb/src/engine.rs"])).await;

    assert!(run.is_none());
    assert_eq!(mock.call_count(), 0);
}
