use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a run request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    /// Fired by the cron-style schedule.
    Schedule,
    /// Fired by the change sensor after the watched input moved forward.
    Sensor,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Schedule => f.write_str("schedule"),
            TriggerSource::Sensor => f.write_str("sensor"),
        }
    }
}

/// How the wait between retries grows.
///
/// - `Fixed`: every retry waits `retry_wait_seconds` (default).
/// - `Exponential`: retry `n` (1-based) waits `retry_wait_seconds * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

impl Default for BackoffKind {
    fn default() -> Self {
        BackoffKind::Fixed
    }
}

/// Mode for storing sensor cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorStorageMode {
    /// Store cursors in a file (`.pipechain/cursors`).
    File,
    /// Store cursors in memory only (lost on restart).
    Memory,
}

impl Default for CursorStorageMode {
    fn default() -> Self {
        CursorStorageMode::File
    }
}
