// src/engine/mod.rs

//! Orchestration engine for pipechain.
//!
//! This module ties together:
//! - the chain executor (node state machine, retries, timeouts)
//! - the run registry (dedup by `run_key`)
//! - the main runtime event loop that reacts to:
//!   - run requests from the schedule trigger and the change sensor
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::TriggerSource;

/// A request to run the chain once.
///
/// Never mutated after creation; consumed at most once by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRequest {
    /// Dedup key. Two requests with the same key produce one run.
    pub run_key: String,
    pub trigger_source: TriggerSource,
    pub requested_at: DateTime<Utc>,
    /// Human-readable label for logs; not part of dedup.
    pub reason: String,
}

impl RunRequest {
    pub fn new(
        run_key: impl Into<String>,
        trigger_source: TriggerSource,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_key: run_key.into(),
            trigger_source,
            requested_at,
            reason: String::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

/// Events flowing into the runtime from the sensor, the schedule and signal
/// handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Run the chain for this request (unless its key was already seen).
    RunRequested(RunRequest),
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod cancel;
pub mod core;
pub mod event_handlers;
pub mod executor;
pub mod outcome;
pub mod registry;
pub mod runtime;

pub use cancel::CancelToken;
pub use self::core::{CoreRuntime, RuntimeOptions};
pub use event_handlers::{CoreCommand, CoreStep};
pub use executor::ChainExecutor;
pub use outcome::{
    AttemptStatus, ExitInfo, Metadata, MetadataValue, NodeStateEntry, RunResult, RunStatus,
    TaskOutcome,
};
pub use registry::{Admission, RunRegistry};
pub use runtime::Runtime;
