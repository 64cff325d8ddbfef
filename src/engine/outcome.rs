// src/engine/outcome.rs

//! Per-attempt outcomes and the aggregated run result.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dag::{NodeName, NodeState};
use crate::engine::RunRequest;
use crate::types::TriggerSource;

/// Typed metadata value attached to an attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl MetadataValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Text(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(v: DateTime<Utc>) -> Self {
        MetadataValue::Timestamp(v)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// Status of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    TransientFailure,
    PermanentFailure,
}

/// What the action reported (or failed to report) for an attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitInfo {
    /// The action completed in-process without an exit status.
    None,
    /// An external process exited. Tails are already truncated.
    Exited {
        code: i32,
        stdout_tail: String,
        stderr_tail: String,
    },
    /// The attempt exceeded its timeout and was abandoned.
    TimedOut { after_secs: f64 },
    /// The action failed before producing an exit status.
    ActionError { message: String },
    /// The node never ran because the run was cancelled.
    Cancelled,
}

/// Outcome of one execution attempt of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub node: NodeName,
    pub status: AttemptStatus,
    /// 1-based attempt number; 0 for nodes that never ran.
    pub attempt: u32,
    pub exit_info: ExitInfo,
    pub metadata: Metadata,
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    /// Duplicate `run_key`; nothing ran.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStateEntry {
    pub node: NodeName,
    pub state: NodeState,
}

/// Aggregated result of one run. Immutable once returned by the executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub run_key: String,
    pub trigger_source: TriggerSource,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub final_status: RunStatus,
    /// Every attempt of every node, in execution order.
    pub node_outcomes: Vec<TaskOutcome>,
    /// Terminal state of each node, in chain order.
    pub node_states: Vec<NodeStateEntry>,
    pub failure_reason: Option<String>,
}

impl RunResult {
    /// Result for a request that was dropped as a duplicate.
    pub fn skipped(request: &RunRequest, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_key: request.run_key.clone(),
            trigger_source: request.trigger_source,
            started_at: now,
            finished_at: now,
            final_status: RunStatus::Skipped,
            node_outcomes: Vec::new(),
            node_states: Vec::new(),
            failure_reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.final_status == RunStatus::Success
    }

    /// All attempts of one node, oldest first.
    pub fn attempts_for<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a TaskOutcome> + 'a {
        self.node_outcomes.iter().filter(move |o| o.node == node)
    }

    /// Latest attempt of one node.
    pub fn latest_outcome(&self, node: &str) -> Option<&TaskOutcome> {
        self.node_outcomes.iter().rev().find(|o| o.node == node)
    }

    pub fn state_of(&self, node: &str) -> Option<NodeState> {
        self.node_states
            .iter()
            .find(|e| e.node == node)
            .map(|e| e.state)
    }
}
