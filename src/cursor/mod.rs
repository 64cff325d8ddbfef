// src/cursor/mod.rs

//! Watermark cursors for watched inputs.
//!
//! A cursor is the last modification time the sensor acted on for a given
//! input. The store itself is a dumb key/value map: `set` overwrites
//! unconditionally and the sensor is responsible for only ever moving a
//! cursor forward.

pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::fs::FileSystem;
use crate::types::CursorStorageMode;

pub use store::{FileCursorStore, MemoryCursorStore, CURSOR_FILE_PATH};

/// Abstract storage for sensor cursors.
///
/// Implementations are internally synchronized so one store can be shared
/// between sensors. They do *not* make a get-then-set sequence atomic;
/// callers that poll the same key concurrently must hold a per-key lock.
pub trait CursorStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<f64>>;
    fn set(&self, key: &str, value: f64) -> Result<()>;
}

/// Last-seen watermark for one watched input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatermarkCursor {
    pub watched_key: String,
    pub value: f64,
}

impl WatermarkCursor {
    /// Read the cursor for `key`, treating an absent entry as `0.0`.
    pub fn load(store: &dyn CursorStore, key: &str) -> Result<Self> {
        let value = store.get(key)?.unwrap_or(0.0);
        Ok(Self {
            watched_key: key.to_string(),
            value,
        })
    }

    /// Whether `observed` is strictly newer than this cursor.
    pub fn is_advanced_by(&self, observed: f64) -> bool {
        observed > self.value
    }
}

/// Build the configured cursor store.
///
/// File stores live under `<root>/.pipechain/cursors`.
pub fn build_cursor_store(
    mode: CursorStorageMode,
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
) -> Arc<dyn CursorStore> {
    match mode {
        CursorStorageMode::File => Arc::new(FileCursorStore::new(root, fs)),
        CursorStorageMode::Memory => Arc::new(MemoryCursorStore::new()),
    }
}
