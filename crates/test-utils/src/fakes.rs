#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pipechain::dag::{ChainGraph, NodeKind, RetryPolicy, TaskNode};
use pipechain::engine::{Metadata, MetadataValue};
use pipechain::exec::{ActionOutcome, BoxFuture, NodeAction, NodeContext, ProcessFailure};
use pipechain::types::BackoffKind;

/// A fake node action that:
/// - records every context it was invoked with
/// - returns scripted outcomes in order, repeating the last one forever.
pub struct ScriptedAction {
    script: Mutex<VecDeque<ActionOutcome>>,
    last: Mutex<ActionOutcome>,
    delay: Option<Duration>,
    calls: AtomicU32,
    seen: Mutex<Vec<NodeContext>>,
}

impl ScriptedAction {
    pub fn new(outcomes: Vec<ActionOutcome>) -> Arc<Self> {
        let last = outcomes
            .last()
            .cloned()
            .unwrap_or_else(|| ActionOutcome::Success(Metadata::new()));
        Arc::new(Self {
            script: Mutex::new(outcomes.into()),
            last: Mutex::new(last),
            delay: None,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Always succeeds with `metadata`.
    pub fn succeeding(metadata: Metadata) -> Arc<Self> {
        Self::new(vec![ActionOutcome::Success(metadata)])
    }

    /// Always fails with the given process result.
    pub fn failing(exit_code: i32, stdout: &str, stderr: &str) -> Arc<Self> {
        Self::new(vec![process_failure(exit_code, stdout, stderr)])
    }

    /// Sleeps for `delay` before every attempt, then succeeds.
    pub fn sleeping(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(ActionOutcome::Success(Metadata::new())),
            delay: Some(delay),
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<NodeContext> {
        self.seen.lock().unwrap().clone()
    }

    fn next_outcome(&self) -> ActionOutcome {
        let mut script = self.script.lock().unwrap();
        match script.pop_front() {
            Some(outcome) => {
                *self.last.lock().unwrap() = outcome.clone();
                outcome
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

impl NodeAction for ScriptedAction {
    fn run<'a>(&'a self, ctx: &'a NodeContext) -> BoxFuture<'a, ActionOutcome> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(ctx.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.next_outcome()
        })
    }
}

pub fn process_failure(exit_code: i32, stdout: &str, stderr: &str) -> ActionOutcome {
    ActionOutcome::ProcessFailed(ProcessFailure {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    })
}

pub fn rows(n: i64) -> Metadata {
    let mut m = Metadata::new();
    m.insert("row_count".to_string(), MetadataValue::Int(n));
    m
}

/// Retry policy with no waiting, for fast tests.
pub fn retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        retry_wait: Duration::ZERO,
        backoff: BackoffKind::Fixed,
    }
}

/// Build the chain from three fakes, all sharing `retry`.
pub fn chain_of(
    ingest: Arc<ScriptedAction>,
    transform: Arc<ScriptedAction>,
    verify: Arc<ScriptedAction>,
    retry: RetryPolicy,
) -> ChainGraph {
    ChainGraph::from_nodes(vec![
        TaskNode::new(NodeKind::Ingest, ingest).with_retry(retry),
        TaskNode::new(NodeKind::Transform, transform).with_retry(retry),
        TaskNode::new(NodeKind::Verify, verify).with_retry(retry),
    ])
}
