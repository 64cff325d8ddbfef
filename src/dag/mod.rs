// src/dag/mod.rs

//! The task chain and its per-run state.
//!
//! - [`graph`] holds the static ingest -> transform -> verify chain.
//! - [`state`] contains the per-node state machine that the executor drives.

pub mod graph;
pub mod state;

pub use graph::{ChainGraph, NodeKind, NodeName, RetryPolicy, TaskNode};
pub use state::{NodeState, RunStates};
