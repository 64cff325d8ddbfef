// tests/integration/command_action.rs
//
// These tests spawn real processes through `sh -c`.

#![cfg(unix)]

use chrono::Utc;

use pipechain::dag::NodeKind;
use pipechain::engine::{Metadata, MetadataValue};
use pipechain::exec::{run_command, ActionOutcome, CommandAction, NodeAction, NodeContext};
use pipechain::types::TriggerSource;

use crate::common::{init_tracing, with_timeout};

fn ctx(node: NodeKind, resource: Option<&str>) -> NodeContext {
    NodeContext {
        run_key: "churn_pipeline_150".to_string(),
        node,
        attempt: 1,
        trigger_source: TriggerSource::Sensor,
        resource: resource.map(str::to_string),
        upstream_metadata: Metadata::new(),
    }
}

#[tokio::test]
async fn run_command_keeps_bounded_tails() {
    let out = with_timeout(run_command(
        "for i in $(seq 1 500); do echo line$i; done; echo oops >&2; exit 3",
        None,
        &[],
        20,
    ))
    .await
    .unwrap();

    assert_eq!(out.exit_code, 3);
    assert!(!out.success());
    assert_eq!(out.stdout_tail.chars().count(), 20);
    assert!(out.stdout_tail.ends_with("line500\n"));
    assert_eq!(out.stderr_tail, "oops\n");
}

#[tokio::test]
async fn child_sees_run_context() {
    let out = with_timeout(run_command(
        "echo $PIPECHAIN_RUN_KEY",
        None,
        &[("PIPECHAIN_RUN_KEY".to_string(), "k1".to_string())],
        100,
    ))
    .await
    .unwrap();
    assert_eq!(out.stdout_tail, "k1\n");
}

#[tokio::test]
async fn ingest_reports_row_count() {
    init_tracing();
    let action = CommandAction::new(
        NodeKind::Ingest,
        "echo loading; echo row_count=1234; echo \"node=$PIPECHAIN_NODE\" >&2",
        2000,
    )
    .unwrap();

    let outcome = with_timeout(action.run(&ctx(NodeKind::Ingest, Some("data/churn.csv")))).await;
    match outcome {
        ActionOutcome::Success(meta) => {
            assert_eq!(meta.get("row_count"), Some(&MetadataValue::Int(1234)));
            assert_eq!(
                meta.get("source_path").and_then(|v| v.as_text()),
                Some("data/churn.csv")
            );
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn ingest_without_row_count_is_an_error() {
    let action = CommandAction::new(NodeKind::Ingest, "echo done", 2000).unwrap();
    let outcome = with_timeout(action.run(&ctx(NodeKind::Ingest, None))).await;
    assert!(matches!(outcome, ActionOutcome::Error(ref m) if m.contains("row_count")));
}

#[tokio::test]
async fn transform_failure_carries_output() {
    let action = CommandAction::new(
        NodeKind::Transform,
        "echo 'could not connect to server' >&2; exit 1",
        2000,
    )
    .unwrap();
    match with_timeout(action.run(&ctx(NodeKind::Transform, None))).await {
        ActionOutcome::ProcessFailed(f) => {
            assert_eq!(f.exit_code, 1);
            assert!(f.stderr.contains("could not connect to server"));
        }
        other => panic!("expected process failure, got {other:?}"),
    }
}

#[tokio::test]
async fn transform_success_records_return_code_and_tail() {
    let action = CommandAction::new(NodeKind::Transform, "echo 'Completed successfully'", 2000)
        .unwrap();
    match with_timeout(action.run(&ctx(NodeKind::Transform, None))).await {
        ActionOutcome::Success(meta) => {
            assert_eq!(meta.get("return_code"), Some(&MetadataValue::Int(0)));
            assert_eq!(
                meta.get("stdout_tail").and_then(|v| v.as_text()),
                Some("Completed successfully\n")
            );
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn verify_parses_checked_at() {
    let action = CommandAction::new(
        NodeKind::Verify,
        "echo row_count=42; echo checked_at=2024-03-01T10:00:00Z",
        2000,
    )
    .unwrap();
    let outcome = with_timeout(action.run(&ctx(
        NodeKind::Verify,
        Some("public_analytics.churn_summary_by_contract"),
    )))
    .await;

    match outcome {
        ActionOutcome::Success(meta) => {
            assert_eq!(meta.get("row_count").and_then(|v| v.as_int()), Some(42));
            match meta.get("checked_at") {
                Some(MetadataValue::Timestamp(ts)) => {
                    assert_eq!(ts.to_rfc3339(), "2024-03-01T10:00:00+00:00")
                }
                other => panic!("expected timestamp, got {other:?}"),
            }
            assert_eq!(
                meta.get("target").and_then(|v| v.as_text()),
                Some("public_analytics.churn_summary_by_contract")
            );
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn verify_defaults_checked_at_to_now() {
    let before = Utc::now();
    let action = CommandAction::new(NodeKind::Verify, "echo row_count=1", 2000).unwrap();
    match with_timeout(action.run(&ctx(NodeKind::Verify, None))).await {
        ActionOutcome::Success(meta) => match meta.get("checked_at") {
            Some(MetadataValue::Timestamp(ts)) => assert!(*ts >= before),
            other => panic!("expected timestamp, got {other:?}"),
        },
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_workdir_is_an_action_error() {
    let action = CommandAction::new(NodeKind::Transform, "true", 2000)
        .unwrap()
        .with_workdir("/definitely/not/a/dir");
    let outcome = with_timeout(action.run(&ctx(NodeKind::Transform, None))).await;
    assert!(matches!(outcome, ActionOutcome::Error(_)));
}

#[tokio::test]
async fn timed_out_pipeline_is_killed_as_a_group() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("late_write");

    let attempt = run_command(
        "{ sleep 1; touch late_write; } | cat",
        Some(dir.path()),
        &[],
        100,
    );
    let timed_out = tokio::time::timeout(std::time::Duration::from_millis(200), attempt).await;
    assert!(timed_out.is_err(), "command should still be running at the deadline");

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    assert!(
        !marker.exists(),
        "a pipeline member outlived its timed-out attempt"
    );
}

#[tokio::test]
async fn output_without_newlines_keeps_only_the_tail() {
    let out = with_timeout(run_command(
        "head -c 3000000 /dev/zero | tr '\\0' 'x'; printf end",
        None,
        &[],
        10,
    ))
    .await
    .unwrap();

    assert!(out.success());
    assert_eq!(out.stdout_tail, "xxxxxxxend");
}

#[tokio::test]
async fn row_count_must_be_within_the_retained_tail() {
    let late = CommandAction::new(
        NodeKind::Ingest,
        "echo row_count=5; head -c 5000 /dev/zero | tr '\\0' '.'",
        2000,
    )
    .unwrap();
    let outcome = with_timeout(late.run(&ctx(NodeKind::Ingest, None))).await;
    assert!(
        matches!(outcome, ActionOutcome::Error(ref m) if m.contains("last 2000 characters")),
        "got {outcome:?}"
    );

    let last = CommandAction::new(
        NodeKind::Ingest,
        "head -c 5000 /dev/zero | tr '\\0' '.'; echo; echo row_count=5",
        2000,
    )
    .unwrap();
    match with_timeout(last.run(&ctx(NodeKind::Ingest, None))).await {
        ActionOutcome::Success(meta) => {
            assert_eq!(meta.get("row_count").and_then(|v| v.as_int()), Some(5))
        }
        other => panic!("expected success, got {other:?}"),
    }
}
