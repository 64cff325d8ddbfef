// src/engine/registry.rs

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

/// Default number of completed run keys remembered for dedup.
pub const DEFAULT_COMPLETED_CAPACITY: usize = 10_000;

/// Admission decision for an incoming run key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// New key; the run should execute.
    Accepted,
    /// The key belongs to the run currently executing.
    DuplicateActive,
    /// The key already finished in this process.
    DuplicateCompleted,
}

/// Registry of run keys seen by this process.
///
/// Semantics:
/// - At most one key is active at a time; runs are serialized.
/// - A key that is active or completed is never admitted again.
/// - Completed keys are remembered up to `capacity`; beyond that the oldest
///   are forgotten. Keys embed a timestamp (cron tick or input mtime), so an
///   evicted key coming back would need a replay from far in the past.
#[derive(Debug)]
pub struct RunRegistry {
    active: Option<String>,
    completed: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLETED_CAPACITY)
    }
}

impl RunRegistry {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            active: None,
            completed: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    /// Decide whether `run_key` may start and, if so, mark it active.
    pub fn try_begin(&mut self, run_key: &str) -> Admission {
        if self.active.as_deref() == Some(run_key) {
            debug!(run_key, "run key is already active");
            return Admission::DuplicateActive;
        }
        if self.completed.contains(run_key) {
            debug!(run_key, "run key already completed");
            return Admission::DuplicateCompleted;
        }

        if let Some(previous) = self.active.take() {
            // Runs are awaited one at a time, so this means `finish` was
            // skipped for the previous run.
            warn!(previous = %previous, run_key, "starting a run while another was still active");
            self.remember(previous);
        }

        self.active = Some(run_key.to_string());
        Admission::Accepted
    }

    /// Mark the active run as finished. Its key stays deduplicated.
    pub fn finish(&mut self, run_key: &str) {
        if self.active.as_deref() == Some(run_key) {
            self.active = None;
        }
        self.remember(run_key.to_string());
    }

    fn remember(&mut self, run_key: String) {
        if !self.completed.insert(run_key.clone()) {
            return;
        }
        self.order.push_back(run_key);

        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.completed.remove(&old);
                debug!(run_key = %old, "forgot oldest completed run key");
            }
        }
    }
}
