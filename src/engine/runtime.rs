// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;

use super::core::CoreRuntime;
use super::{CancelToken, ChainExecutor, CoreCommand, CoreStep, RunResult, RuntimeEvent};

/// Drives the chain executor in response to `RuntimeEvent`s.
///
/// This is a pure IO shell around `CoreRuntime`, which owns dedup and exit
/// semantics. Runs are awaited one at a time, so events that arrive during a
/// run wait in the channel until it finishes.
pub struct Runtime {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: ChainExecutor,
    cancel: CancelToken,
    results_tx: Option<mpsc::UnboundedSender<RunResult>>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: ChainExecutor,
        cancel: CancelToken,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            cancel,
            results_tx: None,
        }
    }

    /// Publish every `RunResult` (including skipped duplicates) here.
    pub fn with_results(mut self, tx: mpsc::UnboundedSender<RunResult>) -> Self {
        self.results_tx = Some(tx);
        self
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core (run, skip, exit).
    pub async fn run(mut self) -> Result<()> {
        info!("pipechain runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            if !self.apply(step).await? {
                info!("core requested exit; stopping runtime");
                break;
            }

            if self.cancel.is_cancelled() {
                info!("cancellation requested; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    /// Execute a step's commands. Returns whether the loop keeps running.
    async fn apply(&mut self, step: CoreStep) -> Result<bool> {
        let mut keep_running = step.keep_running;

        for command in step.commands {
            match command {
                CoreCommand::ExecuteRun(request) => {
                    let result = self.executor.execute(&request, &self.cancel).await?;
                    let after = self.core.run_finished(&result);
                    self.publish(result);
                    // Commands from run completion are only ever an exit
                    // request; `keep_running` carries it.
                    keep_running &= after.keep_running;
                }
                CoreCommand::SkipDuplicate(request) => {
                    self.publish(RunResult::skipped(&request, "duplicate run_key"));
                }
                CoreCommand::RequestExit => {
                    info!("core issued RequestExit command");
                }
            }
        }

        Ok(keep_running)
    }

    fn publish(&self, result: RunResult) {
        if let Some(tx) = &self.results_tx {
            if tx.send(result).is_err() {
                warn!("run result receiver dropped; result discarded");
            }
        }
    }
}
