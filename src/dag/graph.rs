// src/dag/graph.rs

//! The static three-node chain.
//!
//! Arbitrary topology is out of scope, so the chain is an ordered list of
//! node descriptors. Index order *is* topological order.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ConfigFile;
use crate::exec::{NodeAction, NodeActions};
use crate::types::BackoffKind;

/// Canonical node name type used throughout the engine.
pub type NodeName = String;

/// Longest single wait the exponential backoff will produce.
pub const MAX_BACKOFF: Duration = Duration::from_secs(3600);

/// The three stages of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Ingest,
    Transform,
    Verify,
}

impl NodeKind {
    /// All kinds in topological order.
    pub const ALL: [NodeKind; 3] = [NodeKind::Ingest, NodeKind::Transform, NodeKind::Verify];

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Ingest => "ingest",
            NodeKind::Transform => "transform",
            NodeKind::Verify => "verify",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Direct upstream of this node.
    pub fn upstream(self) -> Option<NodeKind> {
        match self {
            NodeKind::Ingest => None,
            NodeKind::Transform => Some(NodeKind::Ingest),
            NodeKind::Verify => Some(NodeKind::Transform),
        }
    }

    /// Whether process failures of this node go through the failure
    /// classifier. Ingest and verify failures are always permanent.
    pub fn retries_on_classified_failure(self) -> bool {
        matches!(self, NodeKind::Transform)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-node retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_wait: Duration,
    pub backoff: BackoffKind,
}

impl RetryPolicy {
    /// No retries, no wait.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            retry_wait: Duration::ZERO,
            backoff: BackoffKind::Fixed,
        }
    }

    /// Total attempts this policy allows (1 initial + retries).
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait before retry number `retry_index` (1-based).
    pub fn wait_before_retry(&self, retry_index: u32) -> Duration {
        match self.backoff {
            BackoffKind::Fixed => self.retry_wait,
            BackoffKind::Exponential => {
                let exp = retry_index.saturating_sub(1).min(31);
                self.retry_wait
                    .checked_mul(1u32 << exp)
                    .unwrap_or(MAX_BACKOFF)
                    .min(MAX_BACKOFF)
            }
        }
    }
}

/// Static description of one node: name, dependencies, action and the
/// knobs that govern its attempts.
#[derive(Clone)]
pub struct TaskNode {
    pub kind: NodeKind,
    pub name: NodeName,
    pub dependencies: BTreeSet<NodeName>,
    pub action: Arc<dyn NodeAction>,
    pub retry: RetryPolicy,
    pub timeout: Option<Duration>,
    /// Data source (ingest) or target (verify) identifier.
    pub resource: Option<String>,
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl TaskNode {
    pub fn new(kind: NodeKind, action: Arc<dyn NodeAction>) -> Self {
        Self {
            kind,
            name: kind.name().to_string(),
            dependencies: kind
                .upstream()
                .map(|u| u.name().to_string())
                .into_iter()
                .collect(),
            action,
            retry: RetryPolicy::none(),
            timeout: None,
            resource: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_resource(mut self, resource: Option<String>) -> Self {
        self.resource = resource;
        self
    }
}

/// The ingest -> transform -> verify chain. Immutable for the process
/// lifetime.
#[derive(Debug, Clone)]
pub struct ChainGraph {
    nodes: Vec<TaskNode>,
}

impl ChainGraph {
    /// Build the chain from a validated config and the actions that back each
    /// node.
    pub fn from_config(cfg: &ConfigFile, actions: NodeActions) -> Self {
        let nodes = NodeKind::ALL
            .into_iter()
            .map(|kind| {
                let node = TaskNode::new(kind, actions.for_kind(kind));
                match cfg.node_config(kind) {
                    Some(nc) => node
                        .with_retry(nc.effective_retry(&cfg.retry))
                        .with_timeout(nc.timeout())
                        .with_resource(match kind {
                            NodeKind::Ingest => nc
                                .data_source
                                .clone()
                                .or_else(|| cfg.pipeline.watched_input_path.clone()),
                            NodeKind::Transform => None,
                            NodeKind::Verify => nc.target.clone(),
                        }),
                    None => node,
                }
            })
            .collect();

        Self { nodes }
    }

    /// Build the chain directly from node descriptors (tests, embedding).
    ///
    /// Nodes are reordered into topological order. Callers pass one node per
    /// kind.
    pub fn from_nodes(mut nodes: Vec<TaskNode>) -> Self {
        nodes.sort_by_key(|n| n.kind);
        Self { nodes }
    }

    /// Nodes in topological order.
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Direct dependencies of a node.
    pub fn dependencies_of(&self, name: &str) -> Vec<NodeName> {
        self.get(name)
            .map(|n| n.dependencies.iter().cloned().collect())
            .unwrap_or_default()
    }
}
