// src/dag/state.rs

//! Per-run node state machine.

use serde::Serialize;
use tracing::{debug, warn};

use crate::dag::graph::{ChainGraph, NodeName};
use crate::errors::{PipechainError, Result};

/// State of a node within one run.
///
/// ```text
/// Pending -> Running -> Succeeded
///                    -> RetryScheduled -> Running
///                    -> Failed
/// ```
///
/// `Pending` and `RetryScheduled` can also go straight to `Failed` when the
/// run is cancelled, an upstream node failed, or the run budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Running,
    Succeeded,
    RetryScheduled,
    Failed,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Succeeded | NodeState::Failed)
    }

    pub fn can_transition_to(self, next: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Succeeded)
                | (Running, RetryScheduled)
                | (Running, Failed)
                | (RetryScheduled, Running)
                | (RetryScheduled, Failed)
        )
    }
}

/// Ordered per-run state for every node of the chain.
#[derive(Debug, Clone)]
pub struct RunStates {
    states: Vec<(NodeName, NodeState)>,
}

impl RunStates {
    /// Every node starts `Pending`.
    pub fn new(graph: &ChainGraph) -> Self {
        Self {
            states: graph
                .node_names()
                .map(|n| (n.to_string(), NodeState::Pending))
                .collect(),
        }
    }

    pub fn get(&self, node: &str) -> Option<NodeState> {
        self.states
            .iter()
            .find(|(name, _)| name == node)
            .map(|(_, s)| *s)
    }

    /// Apply a transition, rejecting anything the state machine doesn't allow.
    pub fn transition(&mut self, node: &str, next: NodeState) -> Result<()> {
        let slot = self
            .states
            .iter_mut()
            .find(|(name, _)| name == node)
            .ok_or_else(|| {
                PipechainError::Other(anyhow::anyhow!("unknown node '{node}'"))
            })?;

        let current = slot.1;
        if !current.can_transition_to(next) {
            warn!(node, from = ?current, to = ?next, "rejected node state transition");
            return Err(PipechainError::InvalidTransition {
                node: node.to_string(),
                from: current,
                to: next,
            });
        }

        debug!(node, from = ?current, to = ?next, "node state transition");
        slot.1 = next;
        Ok(())
    }

    /// Whether every dependency of `node` has `Succeeded` in this run.
    pub fn deps_satisfied(&self, graph: &ChainGraph, node: &str) -> bool {
        graph
            .dependencies_of(node)
            .iter()
            .all(|dep| self.get(dep) == Some(NodeState::Succeeded))
    }

    /// Mark every non-terminal node as `Failed`. Returns the names that
    /// changed.
    pub fn fail_remaining(&mut self) -> Vec<NodeName> {
        let mut failed = Vec::new();
        for (name, state) in self.states.iter_mut() {
            if !state.is_terminal() {
                *state = NodeState::Failed;
                failed.push(name.clone());
            }
        }
        failed
    }

    pub fn all_succeeded(&self) -> bool {
        self.states.iter().all(|(_, s)| *s == NodeState::Succeeded)
    }

    /// Snapshot in topological order.
    pub fn snapshot(&self) -> Vec<(NodeName, NodeState)> {
        self.states.clone()
    }
}
