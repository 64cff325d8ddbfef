// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::info;

use crate::engine::registry::{Admission, RunRegistry};
use crate::engine::{RunRequest, RunResult, RunStatus};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Execute the chain for this request.
    ExecuteRun(RunRequest),
    /// The request's key was already seen; publish a skipped result.
    SkipDuplicate(RunRequest),
    /// Request that the process exits.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn keep_running(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    pub fn exit() -> Self {
        Self {
            commands: vec![CoreCommand::RequestExit],
            keep_running: false,
        }
    }
}

/// Handle a run request.
///
/// - New key: the run is admitted and becomes the active run.
/// - Key already active or completed: nothing executes; the shell publishes
///   a `skipped` result so the duplicate is still observable.
pub fn handle_run_requested(registry: &mut RunRegistry, request: RunRequest) -> CoreStep {
    match registry.try_begin(&request.run_key) {
        Admission::Accepted => {
            info!(
                run_key = %request.run_key,
                trigger = %request.trigger_source,
                reason = %request.reason,
                "admitted run request"
            );
            CoreStep::keep_running(vec![CoreCommand::ExecuteRun(request)])
        }
        Admission::DuplicateActive | Admission::DuplicateCompleted => {
            info!(
                run_key = %request.run_key,
                trigger = %request.trigger_source,
                "duplicate run key; skipping"
            );
            CoreStep::keep_running(vec![CoreCommand::SkipDuplicate(request)])
        }
    }
}

/// Handle the completion of the active run.
///
/// Skipped results never touch the registry: they were never admitted.
pub fn handle_run_finished(
    registry: &mut RunRegistry,
    result: &RunResult,
    exit_after_run: bool,
) -> CoreStep {
    if result.final_status != RunStatus::Skipped {
        registry.finish(&result.run_key);
    }

    if exit_after_run {
        CoreStep::exit()
    } else {
        CoreStep::keep_running(Vec::new())
    }
}

/// Handle a shutdown request.
pub fn handle_shutdown() -> CoreStep {
    info!("shutdown requested");
    CoreStep::exit()
}
