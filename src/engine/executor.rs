// src/engine/executor.rs

//! Task graph executor.
//!
//! Runs the chain for one `RunRequest`: nodes strictly in topological order,
//! each through the per-node state machine in [`crate::dag::state`]. Process
//! failures of the transform stage go through the [`FailureClassifier`];
//! every other failure is permanent. Transient failures are retried with the
//! node's backoff until its attempts run out.
//!
//! Every attempt's [`TaskOutcome`] is recorded in the returned
//! [`RunResult`], in execution order.

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::classify::{tail, FailureClassifier, Verdict};
use crate::dag::{ChainGraph, NodeState, RunStates, TaskNode};
use crate::engine::cancel::CancelToken;
use crate::engine::outcome::{
    AttemptStatus, ExitInfo, Metadata, MetadataValue, NodeStateEntry, RunResult, RunStatus,
    TaskOutcome,
};
use crate::engine::RunRequest;
use crate::errors::Result;
use crate::exec::{ActionOutcome, NodeContext};

const REASON_CANCELLED: &str = "cancelled";
const REASON_RETRIES_EXHAUSTED: &str = "retries exhausted";
const REASON_BUDGET_EXHAUSTED: &str = "run budget exhausted";

/// Verdict for one attempt, with what gets recorded for it.
#[derive(Debug)]
enum AttemptVerdict {
    Success {
        exit_info: ExitInfo,
        metadata: Metadata,
    },
    Transient {
        exit_info: ExitInfo,
        reason: String,
    },
    Permanent {
        exit_info: ExitInfo,
        reason: String,
    },
}

/// How a node ended within a run.
#[derive(Debug)]
enum NodeEnd {
    Succeeded(Metadata),
    Failed(String),
}

/// Per-run bookkeeping shared by the node loop.
struct RunLedger {
    states: RunStates,
    outcomes: Vec<TaskOutcome>,
    started: Instant,
}

impl RunLedger {
    fn record(
        &mut self,
        node: &TaskNode,
        status: AttemptStatus,
        attempt: u32,
        exit_info: ExitInfo,
        metadata: Metadata,
    ) {
        self.outcomes.push(TaskOutcome {
            node: node.name.clone(),
            status,
            attempt,
            exit_info,
            metadata,
        });
    }
}

fn reason_metadata(reason: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("reason".to_string(), MetadataValue::Text(reason.to_string()));
    metadata
}

/// Executes the chain, one run at a time.
#[derive(Debug, Clone)]
pub struct ChainExecutor {
    graph: ChainGraph,
    classifier: FailureClassifier,
    run_budget: Option<Duration>,
}

impl ChainExecutor {
    pub fn new(graph: ChainGraph, classifier: FailureClassifier) -> Self {
        Self {
            graph,
            classifier,
            run_budget: None,
        }
    }

    /// Whole-run wall-clock budget. Timeouts past it are permanent.
    pub fn with_run_budget(mut self, budget: Option<Duration>) -> Self {
        self.run_budget = budget;
        self
    }

    pub fn graph(&self) -> &ChainGraph {
        &self.graph
    }

    /// Run the chain for `request`.
    ///
    /// Node failures are values in the returned `RunResult`; an `Err` means
    /// the state machine itself was violated.
    pub async fn execute(&self, request: &RunRequest, cancel: &CancelToken) -> Result<RunResult> {
        let started_at = Utc::now();
        let mut ledger = RunLedger {
            states: RunStates::new(&self.graph),
            outcomes: Vec::new(),
            started: Instant::now(),
        };
        let mut failure_reason: Option<String> = None;
        let mut upstream_metadata = Metadata::new();

        info!(
            run_key = %request.run_key,
            trigger = %request.trigger_source,
            "run started"
        );

        for node in self.graph.nodes() {
            if cancel.is_cancelled() {
                self.cancel_remaining(&mut ledger);
                failure_reason = Some(REASON_CANCELLED.to_string());
                break;
            }

            if !ledger.states.deps_satisfied(&self.graph, &node.name) {
                warn!(node = %node.name, "dependencies not satisfied; failing remaining nodes");
                ledger.states.fail_remaining();
                failure_reason = Some(format!("{}: dependencies not satisfied", node.name));
                break;
            }

            match self
                .run_node(request, node, &upstream_metadata, &mut ledger, cancel)
                .await?
            {
                NodeEnd::Succeeded(metadata) => upstream_metadata = metadata,
                NodeEnd::Failed(reason) if reason == REASON_CANCELLED => {
                    self.cancel_remaining(&mut ledger);
                    failure_reason = Some(reason);
                    break;
                }
                NodeEnd::Failed(reason) => {
                    let downstream = ledger.states.fail_remaining();
                    if !downstream.is_empty() {
                        debug!(?downstream, "downstream nodes will not run");
                    }
                    failure_reason = Some(format!("{}: {reason}", node.name));
                    break;
                }
            }
        }

        let final_status = if ledger.states.all_succeeded() {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };

        let node_states = ledger
            .states
            .snapshot()
            .into_iter()
            .map(|(node, state)| NodeStateEntry { node, state })
            .collect();

        let result = RunResult {
            run_key: request.run_key.clone(),
            trigger_source: request.trigger_source,
            started_at,
            finished_at: Utc::now(),
            final_status,
            node_outcomes: ledger.outcomes,
            node_states,
            failure_reason,
        };

        match result.final_status {
            RunStatus::Success => info!(
                run_key = %result.run_key,
                attempts = result.node_outcomes.len(),
                "run succeeded"
            ),
            _ => warn!(
                run_key = %result.run_key,
                reason = result.failure_reason.as_deref().unwrap_or(""),
                "run failed"
            ),
        }

        Ok(result)
    }

    /// Mark every node that has not finished as failed because of
    /// cancellation. Nodes that never ran get a synthetic attempt-0 outcome.
    fn cancel_remaining(&self, ledger: &mut RunLedger) {
        let never_ran: Vec<_> = self
            .graph
            .nodes()
            .iter()
            .filter(|n| ledger.states.get(&n.name) == Some(NodeState::Pending))
            .collect();

        let failed = ledger.states.fail_remaining();
        info!(nodes = ?failed, "run cancelled; remaining nodes failed");

        for node in never_ran {
            ledger.record(
                node,
                AttemptStatus::PermanentFailure,
                0,
                ExitInfo::Cancelled,
                reason_metadata(REASON_CANCELLED),
            );
        }
    }

    /// Time left in the run budget, if there is one.
    fn remaining_budget(&self, started: Instant) -> Option<Duration> {
        self.run_budget
            .map(|budget| budget.saturating_sub(started.elapsed()))
    }

    fn budget_exhausted(&self, started: Instant) -> bool {
        self.remaining_budget(started) == Some(Duration::ZERO)
    }

    async fn run_node(
        &self,
        request: &RunRequest,
        node: &TaskNode,
        upstream_metadata: &Metadata,
        ledger: &mut RunLedger,
        cancel: &CancelToken,
    ) -> Result<NodeEnd> {
        let max_attempts = node.retry.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if self.budget_exhausted(ledger.started) {
                ledger.states.transition(&node.name, NodeState::Failed)?;
                ledger.record(
                    node,
                    AttemptStatus::PermanentFailure,
                    0,
                    ExitInfo::None,
                    reason_metadata(REASON_BUDGET_EXHAUSTED),
                );
                return Ok(NodeEnd::Failed(REASON_BUDGET_EXHAUSTED.to_string()));
            }

            ledger.states.transition(&node.name, NodeState::Running)?;

            let ctx = NodeContext {
                run_key: request.run_key.clone(),
                node: node.kind,
                attempt,
                trigger_source: request.trigger_source,
                resource: node.resource.clone(),
                upstream_metadata: upstream_metadata.clone(),
            };

            debug!(node = %node.name, attempt, max_attempts, "starting attempt");
            let verdict = self.attempt(node, &ctx, ledger.started).await;

            match verdict {
                AttemptVerdict::Success {
                    exit_info,
                    metadata,
                } => {
                    ledger.states.transition(&node.name, NodeState::Succeeded)?;
                    info!(node = %node.name, attempt, verdict = "success", "node succeeded");
                    ledger.record(
                        node,
                        AttemptStatus::Success,
                        attempt,
                        exit_info,
                        metadata.clone(),
                    );
                    return Ok(NodeEnd::Succeeded(metadata));
                }
                AttemptVerdict::Permanent { exit_info, reason } => {
                    ledger.states.transition(&node.name, NodeState::Failed)?;
                    warn!(node = %node.name, attempt, verdict = "permanent", %reason, "node failed");
                    ledger.record(
                        node,
                        AttemptStatus::PermanentFailure,
                        attempt,
                        exit_info,
                        reason_metadata(&reason),
                    );
                    return Ok(NodeEnd::Failed(reason));
                }
                AttemptVerdict::Transient { exit_info, reason } => {
                    if attempt >= max_attempts {
                        ledger.states.transition(&node.name, NodeState::Failed)?;
                        warn!(
                            node = %node.name,
                            attempt,
                            verdict = "transient",
                            %reason,
                            "retries exhausted; node failed"
                        );
                        let mut metadata = reason_metadata(REASON_RETRIES_EXHAUSTED);
                        metadata.insert("last_error".to_string(), MetadataValue::Text(reason));
                        ledger.record(
                            node,
                            AttemptStatus::PermanentFailure,
                            attempt,
                            exit_info,
                            metadata,
                        );
                        return Ok(NodeEnd::Failed(REASON_RETRIES_EXHAUSTED.to_string()));
                    }

                    let wait = node.retry.wait_before_retry(attempt);
                    let over_budget = self
                        .remaining_budget(ledger.started)
                        .is_some_and(|left| wait >= left);
                    if over_budget {
                        ledger.states.transition(&node.name, NodeState::Failed)?;
                        warn!(
                            node = %node.name,
                            attempt,
                            wait_secs = wait.as_secs_f64(),
                            "retry would exceed the run budget; node failed"
                        );
                        let mut metadata = reason_metadata(REASON_BUDGET_EXHAUSTED);
                        metadata.insert("last_error".to_string(), MetadataValue::Text(reason));
                        ledger.record(
                            node,
                            AttemptStatus::PermanentFailure,
                            attempt,
                            exit_info,
                            metadata,
                        );
                        return Ok(NodeEnd::Failed(REASON_BUDGET_EXHAUSTED.to_string()));
                    }

                    ledger
                        .states
                        .transition(&node.name, NodeState::RetryScheduled)?;
                    info!(
                        node = %node.name,
                        attempt,
                        verdict = "transient",
                        %reason,
                        wait_secs = wait.as_secs_f64(),
                        "transient failure; retry scheduled"
                    );
                    ledger.record(
                        node,
                        AttemptStatus::TransientFailure,
                        attempt,
                        exit_info,
                        reason_metadata(&reason),
                    );

                    if !wait.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(wait) => {}
                            _ = cancel.cancelled() => {}
                        }
                    }

                    // The node is between attempts, which is a boundary.
                    if cancel.is_cancelled() {
                        ledger.states.transition(&node.name, NodeState::Failed)?;
                        info!(node = %node.name, "run cancelled while waiting to retry");
                        return Ok(NodeEnd::Failed(REASON_CANCELLED.to_string()));
                    }
                }
            }
        }
    }

    /// Invoke the node's action once and turn the result into a verdict.
    async fn attempt(&self, node: &TaskNode, ctx: &NodeContext, started: Instant) -> AttemptVerdict {
        let limit = match (node.timeout, self.remaining_budget(started)) {
            (Some(t), Some(left)) => Some(t.min(left)),
            (t, left) => t.or(left),
        };

        let outcome = match limit {
            Some(limit) => match timeout(limit, node.action.run(ctx)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let exit_info = ExitInfo::TimedOut {
                        after_secs: limit.as_secs_f64(),
                    };
                    if self.budget_exhausted(started) {
                        return AttemptVerdict::Permanent {
                            exit_info,
                            reason: REASON_BUDGET_EXHAUSTED.to_string(),
                        };
                    }
                    return AttemptVerdict::Transient {
                        exit_info,
                        reason: format!("timed out after {:.1}s", limit.as_secs_f64()),
                    };
                }
            },
            None => node.action.run(ctx).await,
        };

        match outcome {
            ActionOutcome::Success(metadata) => AttemptVerdict::Success {
                exit_info: ExitInfo::None,
                metadata,
            },
            ActionOutcome::Error(message) => AttemptVerdict::Permanent {
                reason: message.clone(),
                exit_info: ExitInfo::ActionError { message },
            },
            ActionOutcome::ProcessFailed(failure) => {
                let n = self.classifier.tail_chars();
                let stdout_tail = tail(&failure.stdout, n).to_string();
                let stderr_tail = tail(&failure.stderr, n).to_string();

                let verdict = if node.kind.retries_on_classified_failure() {
                    self.classifier
                        .classify(failure.exit_code, &stdout_tail, &stderr_tail)
                } else {
                    Verdict::Permanent
                };

                let exit_info = ExitInfo::Exited {
                    code: failure.exit_code,
                    stdout_tail,
                    stderr_tail,
                };

                match verdict {
                    Verdict::Success => {
                        let mut metadata = Metadata::new();
                        metadata.insert(
                            "return_code".to_string(),
                            MetadataValue::Int(i64::from(failure.exit_code)),
                        );
                        AttemptVerdict::Success {
                            exit_info,
                            metadata,
                        }
                    }
                    Verdict::Transient => AttemptVerdict::Transient {
                        exit_info,
                        reason: format!("transient failure (exit code {})", failure.exit_code),
                    },
                    Verdict::Permanent => AttemptVerdict::Permanent {
                        exit_info,
                        reason: format!("exit code {}", failure.exit_code),
                    },
                }
            }
        }
    }
}
