// tests/executor.rs

mod common;

use std::time::Duration;

use chrono::Utc;

use common::fakes::{chain_of, process_failure, retries, rows, ScriptedAction};
use pipechain::classify::FailureClassifier;
use pipechain::config::ClassifierSection;
use pipechain::dag::{ChainGraph, NodeKind, NodeState, RetryPolicy, TaskNode};
use pipechain::engine::{
    AttemptStatus, CancelToken, ChainExecutor, ExitInfo, Metadata, RunRequest, RunStatus,
};
use pipechain::exec::ActionOutcome;
use pipechain::types::{BackoffKind, TriggerSource};

fn classifier() -> FailureClassifier {
    FailureClassifier::from_config(&ClassifierSection::default())
}

fn request(key: &str) -> RunRequest {
    RunRequest::new(key, TriggerSource::Sensor, Utc::now())
}

fn refused() -> ActionOutcome {
    process_failure(1, "", "could not connect to server: Connection refused")
}

#[tokio::test]
async fn happy_path_runs_all_nodes_in_order() {
    common::init_tracing();
    let ingest = ScriptedAction::succeeding(rows(42));
    let transform = ScriptedAction::succeeding(Metadata::new());
    let verify = ScriptedAction::succeeding(rows(7));

    let exec = ChainExecutor::new(
        chain_of(ingest.clone(), transform.clone(), verify.clone(), retries(3)),
        classifier(),
    );
    let result = exec
        .execute(&request("churn_pipeline_150"), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(result.final_status, RunStatus::Success);
    assert!(result.failure_reason.is_none());
    let order: Vec<_> = result.node_outcomes.iter().map(|o| o.node.as_str()).collect();
    assert_eq!(order, ["ingest", "transform", "verify"]);
    assert!(result.node_outcomes.iter().all(|o| o.attempt == 1));
    for node in ["ingest", "transform", "verify"] {
        assert_eq!(result.state_of(node), Some(NodeState::Succeeded));
    }

    // Upstream metadata flows into the next node's context.
    let seen = transform.contexts();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].upstream_metadata.get("row_count").and_then(|v| v.as_int()),
        Some(42)
    );
    assert_eq!(seen[0].run_key, "churn_pipeline_150");
    assert_eq!(seen[0].trigger_source, TriggerSource::Sensor);
}

#[tokio::test]
async fn always_transient_transform_gets_max_retries_plus_one_attempts() {
    let ingest = ScriptedAction::succeeding(rows(1));
    let transform = ScriptedAction::new(vec![refused()]);
    let verify = ScriptedAction::succeeding(rows(1));

    let exec = ChainExecutor::new(
        chain_of(ingest, transform.clone(), verify.clone(), retries(2)),
        classifier(),
    );
    let result = exec.execute(&request("r1"), &CancelToken::new()).await.unwrap();

    assert_eq!(transform.calls(), 3);
    assert_eq!(verify.calls(), 0);
    assert_eq!(result.final_status, RunStatus::Failed);
    assert_eq!(result.state_of("transform"), Some(NodeState::Failed));
    assert_eq!(result.state_of("verify"), Some(NodeState::Failed));

    let attempts: Vec<_> = result.attempts_for("transform").collect();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0].status, AttemptStatus::TransientFailure);
    assert_eq!(attempts[1].status, AttemptStatus::TransientFailure);
    assert_eq!(attempts[2].status, AttemptStatus::PermanentFailure);
    assert_eq!(
        attempts.iter().map(|a| a.attempt).collect::<Vec<_>>(),
        [1, 2, 3]
    );
    assert_eq!(
        attempts[2].metadata.get("reason").and_then(|v| v.as_text()),
        Some("retries exhausted")
    );
    assert!(result
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("retries exhausted"));
}

#[tokio::test]
async fn transient_then_success_recovers() {
    let transform = ScriptedAction::new(vec![
        refused(),
        ActionOutcome::Success(Metadata::new()),
    ]);
    let exec = ChainExecutor::new(
        chain_of(
            ScriptedAction::succeeding(rows(1)),
            transform.clone(),
            ScriptedAction::succeeding(rows(1)),
            retries(3),
        ),
        classifier(),
    );
    let result = exec.execute(&request("r2"), &CancelToken::new()).await.unwrap();

    assert!(result.is_success());
    assert_eq!(transform.calls(), 2);
    let latest = result.latest_outcome("transform").unwrap();
    assert_eq!(latest.status, AttemptStatus::Success);
    assert_eq!(latest.attempt, 2);
    // The failed attempt is kept in the history.
    assert_eq!(result.node_outcomes.len(), 4);
}

#[tokio::test]
async fn permanent_ingest_failure_stops_the_chain() {
    let ingest = ScriptedAction::new(vec![ActionOutcome::Error(
        "csv missing column 'churn'".to_string(),
    )]);
    let transform = ScriptedAction::succeeding(Metadata::new());
    let verify = ScriptedAction::succeeding(rows(1));

    let exec = ChainExecutor::new(
        chain_of(ingest.clone(), transform.clone(), verify.clone(), retries(3)),
        classifier(),
    );
    let result = exec.execute(&request("r3"), &CancelToken::new()).await.unwrap();

    assert_eq!(result.final_status, RunStatus::Failed);
    assert_eq!(ingest.calls(), 1);
    assert_eq!(transform.calls(), 0);
    assert_eq!(verify.calls(), 0);
    assert_eq!(result.node_outcomes.len(), 1);
    assert!(matches!(
        result.node_outcomes[0].exit_info,
        ExitInfo::ActionError { .. }
    ));
    assert_eq!(result.state_of("transform"), Some(NodeState::Failed));
}

#[tokio::test]
async fn ingest_process_failure_is_never_classified() {
    // Even a connectivity message does not make ingest retry.
    let ingest = ScriptedAction::new(vec![refused()]);
    let exec = ChainExecutor::new(
        chain_of(
            ingest.clone(),
            ScriptedAction::succeeding(Metadata::new()),
            ScriptedAction::succeeding(rows(1)),
            retries(3),
        ),
        classifier(),
    );
    let result = exec.execute(&request("r4"), &CancelToken::new()).await.unwrap();

    assert_eq!(ingest.calls(), 1);
    assert_eq!(
        result.latest_outcome("ingest").unwrap().status,
        AttemptStatus::PermanentFailure
    );
}

#[tokio::test]
async fn permanent_transform_failure_keeps_truncated_output() {
    let long = format!("{}syntax error at line 3", "x".repeat(5000));
    let transform = ScriptedAction::new(vec![process_failure(2, &long, "")]);
    let exec = ChainExecutor::new(
        chain_of(
            ScriptedAction::succeeding(rows(1)),
            transform.clone(),
            ScriptedAction::succeeding(rows(1)),
            retries(3),
        ),
        FailureClassifier::new(["connection refused"], 100),
    );
    let result = exec.execute(&request("r5"), &CancelToken::new()).await.unwrap();

    assert_eq!(transform.calls(), 1);
    match &result.latest_outcome("transform").unwrap().exit_info {
        ExitInfo::Exited {
            code, stdout_tail, ..
        } => {
            assert_eq!(*code, 2);
            assert_eq!(stdout_tail.chars().count(), 100);
            assert!(stdout_tail.ends_with("syntax error at line 3"));
        }
        other => panic!("expected exit info, got {other:?}"),
    }
}

#[tokio::test]
async fn verify_failure_is_permanent() {
    let verify = ScriptedAction::new(vec![ActionOutcome::Error("relation does not exist".into())]);
    let exec = ChainExecutor::new(
        chain_of(
            ScriptedAction::succeeding(rows(1)),
            ScriptedAction::succeeding(Metadata::new()),
            verify.clone(),
            retries(3),
        ),
        classifier(),
    );
    let result = exec.execute(&request("r6"), &CancelToken::new()).await.unwrap();

    assert_eq!(verify.calls(), 1);
    assert_eq!(result.final_status, RunStatus::Failed);
    assert_eq!(result.state_of("ingest"), Some(NodeState::Succeeded));
    assert_eq!(result.state_of("transform"), Some(NodeState::Succeeded));
    assert_eq!(result.state_of("verify"), Some(NodeState::Failed));
}

#[tokio::test]
async fn timeout_is_transient_within_budget() {
    let slow = ScriptedAction::sleeping(Duration::from_secs(30));
    let graph = ChainGraph::from_nodes(vec![
        TaskNode::new(NodeKind::Ingest, ScriptedAction::succeeding(rows(1))),
        TaskNode::new(NodeKind::Transform, slow.clone())
            .with_retry(retries(1))
            .with_timeout(Some(Duration::from_millis(20))),
        TaskNode::new(NodeKind::Verify, ScriptedAction::succeeding(rows(1))),
    ]);
    let exec = ChainExecutor::new(graph, classifier());
    let result = common::with_timeout(exec.execute(&request("r7"), &CancelToken::new()))
        .await
        .unwrap();

    assert_eq!(slow.calls(), 2);
    let attempts: Vec<_> = result.attempts_for("transform").collect();
    assert_eq!(attempts[0].status, AttemptStatus::TransientFailure);
    assert!(matches!(attempts[0].exit_info, ExitInfo::TimedOut { .. }));
    assert_eq!(attempts[1].status, AttemptStatus::PermanentFailure);
}

#[tokio::test]
async fn timeout_past_run_budget_is_permanent() {
    let slow = ScriptedAction::sleeping(Duration::from_secs(30));
    let graph = ChainGraph::from_nodes(vec![
        TaskNode::new(NodeKind::Ingest, ScriptedAction::succeeding(rows(1))),
        TaskNode::new(NodeKind::Transform, slow.clone())
            .with_retry(retries(5))
            .with_timeout(Some(Duration::from_secs(10))),
        TaskNode::new(NodeKind::Verify, ScriptedAction::succeeding(rows(1))),
    ]);
    let exec =
        ChainExecutor::new(graph, classifier()).with_run_budget(Some(Duration::from_millis(50)));
    let result = common::with_timeout(exec.execute(&request("r8"), &CancelToken::new()))
        .await
        .unwrap();

    assert_eq!(slow.calls(), 1);
    let last = result.latest_outcome("transform").unwrap();
    assert_eq!(last.status, AttemptStatus::PermanentFailure);
    assert!(matches!(last.exit_info, ExitInfo::TimedOut { .. }));
    assert!(result
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("run budget exhausted"));
}

#[tokio::test]
async fn retry_wait_beyond_budget_is_refused() {
    let transform = ScriptedAction::new(vec![refused()]);
    let retry = RetryPolicy {
        max_retries: 3,
        retry_wait: Duration::from_secs(60),
        backoff: BackoffKind::Fixed,
    };
    let exec = ChainExecutor::new(
        chain_of(
            ScriptedAction::succeeding(rows(1)),
            transform.clone(),
            ScriptedAction::succeeding(rows(1)),
            retry,
        ),
        classifier(),
    )
    .with_run_budget(Some(Duration::from_secs(5)));

    let result = common::with_timeout(exec.execute(&request("r9"), &CancelToken::new()))
        .await
        .unwrap();

    assert_eq!(transform.calls(), 1);
    assert_eq!(result.final_status, RunStatus::Failed);
    assert_eq!(
        result.latest_outcome("transform").unwrap().status,
        AttemptStatus::PermanentFailure
    );
}

#[tokio::test]
async fn cancelled_run_fails_remaining_nodes_without_invoking_them() {
    let ingest = ScriptedAction::succeeding(rows(1));
    let transform = ScriptedAction::succeeding(Metadata::new());
    let verify = ScriptedAction::succeeding(rows(1));
    let exec = ChainExecutor::new(
        chain_of(ingest.clone(), transform.clone(), verify.clone(), retries(0)),
        classifier(),
    );

    let cancel = CancelToken::new();
    cancel.cancel();
    let result = exec.execute(&request("r10"), &cancel).await.unwrap();

    assert_eq!(ingest.calls() + transform.calls() + verify.calls(), 0);
    assert_eq!(result.final_status, RunStatus::Failed);
    assert_eq!(result.failure_reason.as_deref(), Some("cancelled"));
    assert_eq!(result.node_outcomes.len(), 3);
    for outcome in &result.node_outcomes {
        assert_eq!(outcome.attempt, 0);
        assert_eq!(outcome.exit_info, ExitInfo::Cancelled);
        assert_eq!(
            outcome.metadata.get("reason").and_then(|v| v.as_text()),
            Some("cancelled")
        );
    }
}

#[tokio::test]
async fn cancel_during_retry_wait_stops_at_the_boundary() {
    let transform = ScriptedAction::new(vec![refused()]);
    let verify = ScriptedAction::succeeding(rows(1));
    let retry = RetryPolicy {
        max_retries: 3,
        retry_wait: Duration::from_secs(30),
        backoff: BackoffKind::Fixed,
    };
    let exec = ChainExecutor::new(
        chain_of(
            ScriptedAction::succeeding(rows(1)),
            transform.clone(),
            verify.clone(),
            retry,
        ),
        classifier(),
    );

    let cancel = CancelToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };

    let result = common::with_timeout(exec.execute(&request("r11"), &cancel))
        .await
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(transform.calls(), 1);
    assert_eq!(verify.calls(), 0);
    assert_eq!(result.failure_reason.as_deref(), Some("cancelled"));
    assert_eq!(result.state_of("transform"), Some(NodeState::Failed));
    let verify_outcome = result.latest_outcome("verify").unwrap();
    assert_eq!(verify_outcome.exit_info, ExitInfo::Cancelled);
}

#[test]
fn exponential_backoff_doubles_and_caps() {
    let policy = RetryPolicy {
        max_retries: 20,
        retry_wait: Duration::from_secs(30),
        backoff: BackoffKind::Exponential,
    };
    assert_eq!(policy.wait_before_retry(1), Duration::from_secs(30));
    assert_eq!(policy.wait_before_retry(2), Duration::from_secs(60));
    assert_eq!(policy.wait_before_retry(3), Duration::from_secs(120));
    assert_eq!(policy.wait_before_retry(8), Duration::from_secs(3600));
    assert_eq!(policy.wait_before_retry(40), Duration::from_secs(3600));

    let fixed = RetryPolicy {
        backoff: BackoffKind::Fixed,
        ..policy
    };
    assert_eq!(fixed.wait_before_retry(5), Duration::from_secs(30));
    assert_eq!(fixed.max_attempts(), 21);
}

#[test]
fn illegal_transitions_are_rejected() {
    use pipechain::dag::RunStates;
    use pipechain::errors::PipechainError;

    let graph = chain_of(
        ScriptedAction::succeeding(rows(1)),
        ScriptedAction::succeeding(rows(1)),
        ScriptedAction::succeeding(rows(1)),
        retries(0),
    );
    let mut states = RunStates::new(&graph);

    let err = states.transition("ingest", NodeState::Succeeded).unwrap_err();
    assert!(matches!(err, PipechainError::InvalidTransition { .. }));
    assert_eq!(states.get("ingest"), Some(NodeState::Pending));

    states.transition("ingest", NodeState::Running).unwrap();
    states.transition("ingest", NodeState::Succeeded).unwrap();
    assert!(states.transition("ingest", NodeState::Running).is_err());
    assert!(!states.deps_satisfied(&graph, "verify"));
    assert!(states.deps_satisfied(&graph, "transform"));
}

#[test]
fn chain_has_fixed_topology() {
    let graph = chain_of(
        ScriptedAction::succeeding(rows(1)),
        ScriptedAction::succeeding(rows(1)),
        ScriptedAction::succeeding(rows(1)),
        retries(0),
    );
    let names: Vec<_> = graph.node_names().collect();
    assert_eq!(names, ["ingest", "transform", "verify"]);
    assert!(graph.dependencies_of("ingest").is_empty());
    assert_eq!(graph.dependencies_of("transform"), ["ingest"]);
    assert_eq!(graph.dependencies_of("verify"), ["transform"]);
}
