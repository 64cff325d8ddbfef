// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state (the run-key registry)
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for reading
//! events from the channel, awaiting the executor and handling Ctrl+C.
//!
//! The core is unit tested without any Tokio, channels, filesystem, or
//! processes.

use crate::engine::event_handlers::{
    handle_run_finished, handle_run_requested, handle_shutdown, CoreStep,
};
use crate::engine::registry::RunRegistry;
use crate::engine::{RunResult, RuntimeEvent};

/// Options affecting when the runtime stops.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Stop after the first executed run.
    pub exit_after_run: bool,
}

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug, Default)]
pub struct CoreRuntime {
    registry: RunRegistry,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(registry: RunRegistry, options: RuntimeOptions) -> Self {
        Self { registry, options }
    }

    /// Expose whether a run is active (for tests).
    pub fn is_idle(&self) -> bool {
        self.registry.is_idle()
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::RunRequested(request) => {
                handle_run_requested(&mut self.registry, request)
            }
            RuntimeEvent::ShutdownRequested => handle_shutdown(),
        }
    }

    /// Record that the executor returned `result` for the active run.
    pub fn run_finished(&mut self, result: &RunResult) -> CoreStep {
        handle_run_finished(&mut self.registry, result, self.options.exit_after_run)
    }
}
