// src/cursor/store.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

use crate::cursor::CursorStore;
use crate::fs::FileSystem;

/// Relative path (from the config root) to the cursor file.
///
/// The effective path on disk is `<root>/.pipechain/cursors`.
pub const CURSOR_FILE_PATH: &str = ".pipechain/cursors";

fn cursor_file_path(root: &Path) -> PathBuf {
    root.join(CURSOR_FILE_PATH)
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains(['\n', '\r']) {
        return Err(anyhow!("invalid cursor key {:?}", key));
    }
    Ok(())
}

/// Stores cursors in a file (`.pipechain/cursors`), one `<key>\t<value>`
/// per line.
///
/// Every `get` re-reads the file so that cursors written by another process
/// (or before a restart) are picked up.
#[derive(Debug)]
pub struct FileCursorStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    /// Serializes read-modify-write of the whole file.
    write_lock: Mutex<()>,
}

impl FileCursorStore {
    pub fn new(root: PathBuf, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root,
            fs,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        cursor_file_path(&self.root)
    }
}

impl CursorStore for FileCursorStore {
    fn get(&self, key: &str) -> Result<Option<f64>> {
        let map = load_all_cursors(self.fs.as_ref(), &self.root)?;
        Ok(map.get(key).copied())
    }

    fn set(&self, key: &str, value: f64) -> Result<()> {
        check_key(key)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("cursor file lock poisoned"))?;

        let mut map = load_all_cursors(self.fs.as_ref(), &self.root)?;
        map.insert(key.to_string(), value);
        save_all_cursors(self.fs.as_ref(), &self.root, &map)?;
        info!(key = %key, value, "stored cursor (file)");
        Ok(())
    }
}

/// Stores cursors in memory only.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    map: Mutex<BTreeMap<String, f64>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for MemoryCursorStore {
    fn get(&self, key: &str) -> Result<Option<f64>> {
        let map = self
            .map
            .lock()
            .map_err(|_| anyhow!("cursor map lock poisoned"))?;
        Ok(map.get(key).copied())
    }

    fn set(&self, key: &str, value: f64) -> Result<()> {
        check_key(key)?;
        let mut map = self
            .map
            .lock()
            .map_err(|_| anyhow!("cursor map lock poisoned"))?;
        map.insert(key.to_string(), value);
        info!(key = %key, value, "stored cursor (memory)");
        Ok(())
    }
}

/// Load all stored cursors from `<root>/.pipechain/cursors`.
fn load_all_cursors(fs: &dyn FileSystem, root: &Path) -> Result<BTreeMap<String, f64>> {
    let path = cursor_file_path(root);

    if !fs.exists(&path) {
        return Ok(BTreeMap::new());
    }

    let contents = fs
        .read_to_string(&path)
        .with_context(|| format!("reading cursor file at {:?}", path))?;

    let mut map = BTreeMap::new();

    for (lineno, line) in contents.lines().enumerate() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        // Keys may contain spaces (they are paths); the value never does.
        let (key, value) = trimmed
            .rsplit_once(char::is_whitespace)
            .ok_or_else(|| anyhow!("malformed cursor line {} in {:?}", lineno + 1, path))?;
        let value: f64 = value.parse().with_context(|| {
            format!("invalid cursor value on line {} in {:?}", lineno + 1, path)
        })?;
        map.insert(key.to_string(), value);
    }

    debug!(entries = map.len(), "loaded cursor file");
    Ok(map)
}

/// Persist all cursors to `<root>/.pipechain/cursors`.
///
/// The new contents go to a sibling `.tmp` file that is renamed over the
/// cursor file, so a failed or interrupted write leaves the previous
/// watermarks in place.
fn save_all_cursors(fs: &dyn FileSystem, root: &Path, map: &BTreeMap<String, f64>) -> Result<()> {
    let path = cursor_file_path(root);
    let tmp = path.with_extension("tmp");

    let mut out = String::new();
    for (key, value) in map {
        out.push_str(key);
        out.push('\t');
        out.push_str(&value.to_string());
        out.push('\n');
    }

    fs.write(&tmp, out.as_bytes())
        .with_context(|| format!("writing cursor file at {:?}", tmp))?;
    fs.rename(&tmp, &path)
        .with_context(|| format!("replacing cursor file at {:?}", path))
}
