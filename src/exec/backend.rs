// src/exec/backend.rs

//! Pluggable node action abstraction.
//!
//! The executor talks to a `NodeAction` per node instead of spawning
//! processes itself. Production wires every node to a [`CommandAction`];
//! tests substitute scripted fakes that never touch the OS.
//!
//! [`CommandAction`]: crate::exec::CommandAction

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::dag::NodeKind;
use crate::engine::Metadata;
use crate::types::TriggerSource;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a node is told about the attempt it is running.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub run_key: String,
    pub node: NodeKind,
    /// 1-based attempt number.
    pub attempt: u32,
    pub trigger_source: TriggerSource,
    /// Data source (ingest) or target (verify) identifier.
    pub resource: Option<String>,
    /// Metadata produced by the upstream node's successful attempt.
    pub upstream_metadata: Metadata,
}

/// A failed external process: exit code plus captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFailure {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Result of one invocation of a node action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Success payload; becomes the attempt's metadata.
    Success(Metadata),
    /// The external process exited non-zero. Transform failures go through
    /// the failure classifier; ingest and verify failures are permanent.
    ProcessFailed(ProcessFailure),
    /// Data-access / query / spawn failure. Always permanent.
    Error(String),
}

/// Trait abstracting the opaque work a node performs.
pub trait NodeAction: Send + Sync {
    /// Run one attempt.
    ///
    /// The returned future may be dropped (timeout); implementations must
    /// not leave work running when that happens.
    fn run<'a>(&'a self, ctx: &'a NodeContext) -> BoxFuture<'a, ActionOutcome>;
}

/// The three actions backing the chain.
#[derive(Clone)]
pub struct NodeActions {
    pub ingest: Arc<dyn NodeAction>,
    pub transform: Arc<dyn NodeAction>,
    pub verify: Arc<dyn NodeAction>,
}

impl NodeActions {
    pub fn for_kind(&self, kind: NodeKind) -> Arc<dyn NodeAction> {
        match kind {
            NodeKind::Ingest => Arc::clone(&self.ingest),
            NodeKind::Transform => Arc::clone(&self.transform),
            NodeKind::Verify => Arc::clone(&self.verify),
        }
    }
}
