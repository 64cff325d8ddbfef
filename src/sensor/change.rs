// src/sensor/change.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::cursor::{CursorStore, WatermarkCursor};
use crate::engine::RunRequest;
use crate::errors::{PipechainError, Result};
use crate::fs::FileSystem;
use crate::sensor::locks::{acquire, KeyedLocks};
use crate::sensor::SensorOutcome;
use crate::types::TriggerSource;

/// Run key for an observed mtime: `<prefix>_<integer seconds>`.
///
/// Two polls that see the same mtime produce the same key, so the runtime
/// runs the chain once for them.
pub fn sensor_run_key(prefix: &str, mtime: f64) -> String {
    format!("{prefix}_{}", mtime.trunc() as i64)
}

/// Watches one input's modification time against a stored watermark.
pub struct ChangeSensor {
    key: String,
    path: PathBuf,
    run_key_prefix: String,
    fs: Arc<dyn FileSystem>,
    store: Arc<dyn CursorStore>,
    locks: Arc<KeyedLocks>,
}

impl fmt::Debug for ChangeSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSensor")
            .field("key", &self.key)
            .field("path", &self.path)
            .field("run_key_prefix", &self.run_key_prefix)
            .finish_non_exhaustive()
    }
}

impl ChangeSensor {
    /// A sensor for `path`, using the path's display form as the cursor key.
    pub fn new(
        path: impl Into<PathBuf>,
        run_key_prefix: impl Into<String>,
        fs: Arc<dyn FileSystem>,
        store: Arc<dyn CursorStore>,
    ) -> Self {
        let path = path.into();
        Self {
            key: path.display().to_string(),
            path,
            run_key_prefix: run_key_prefix.into(),
            fs,
            store,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Override the cursor key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Share a lock registry with other sensors.
    pub fn with_locks(mut self, locks: Arc<KeyedLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Poll once.
    ///
    /// The cursor is advanced *before* the request is returned: if the
    /// process dies between the two, that change is never run.
    pub fn poll(&self, now: DateTime<Utc>) -> Result<SensorOutcome> {
        let lock = self.locks.lock_for(&self.key);
        let _guard = acquire(&lock);

        let mtime = match self.fs.modified_secs(&self.path) {
            Ok(Some(m)) => m,
            Ok(None) => {
                let reason = format!("input not found at {}", self.path.display());
                debug!(key = %self.key, %reason, "sensor skip");
                return Ok(SensorOutcome::Skip { reason });
            }
            Err(e) => {
                return Err(PipechainError::Stat {
                    path: self.path.display().to_string(),
                    message: format!("{e:#}"),
                });
            }
        };

        let cursor = WatermarkCursor::load(self.store.as_ref(), &self.key).map_err(|e| {
            PipechainError::CursorStore(format!("reading cursor '{}': {e:#}", self.key))
        })?;

        if !cursor.is_advanced_by(mtime) {
            let reason = format!(
                "input unchanged (mtime {mtime} <= cursor {})",
                cursor.value
            );
            debug!(key = %self.key, %reason, "sensor skip");
            return Ok(SensorOutcome::Skip { reason });
        }

        self.store.set(&self.key, mtime).map_err(|e| {
            PipechainError::CursorStore(format!("writing cursor '{}': {e:#}", self.key))
        })?;

        let run_key = sensor_run_key(&self.run_key_prefix, mtime);
        info!(
            key = %self.key,
            cursor_before = cursor.value,
            cursor_after = mtime,
            %run_key,
            "input changed; requesting run"
        );

        let request = RunRequest::new(run_key, TriggerSource::Sensor, now)
            .with_reason(format!("input changed: {}", self.path.display()));

        Ok(SensorOutcome::Triggered {
            request,
            cursor_before: cursor.value,
            cursor_after: mtime,
        })
    }
}
