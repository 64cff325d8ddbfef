// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct MockFile {
    content: Vec<u8>,
    mtime: f64,
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, MockFile>,
    fail_reads: bool,
    fail_writes: bool,
    fail_stat: bool,
    torn_writes: bool,
}

/// In-memory filesystem with controllable mtimes and failure injection.
///
/// Clones share the same state, so a test can keep a handle while the
/// sensor or cursor store owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add (or replace) a file with mtime 0.0.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.add_file_with_mtime(path, content, 0.0);
    }

    pub fn add_file_with_mtime(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
        mtime: f64,
    ) {
        self.lock().files.insert(
            path.as_ref().to_path_buf(),
            MockFile {
                content: content.into(),
                mtime,
            },
        );
    }

    /// Touch a file: set its mtime, creating an empty file if needed.
    pub fn set_modified(&self, path: impl AsRef<Path>, mtime: f64) {
        let mut state = self.lock();
        state
            .files
            .entry(path.as_ref().to_path_buf())
            .and_modify(|f| f.mtime = mtime)
            .or_insert(MockFile {
                content: Vec::new(),
                mtime,
            });
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.lock().files.remove(path.as_ref());
    }

    /// Make `read_to_string` fail for every path.
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Make `write` fail for every path.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Make `write` truncate its target and then fail, like a crash or a
    /// full disk halfway through a write.
    pub fn set_torn_writes(&self, torn: bool) {
        self.lock().torn_writes = torn;
    }

    /// Make `modified_secs` fail (other than not-found) for every path.
    pub fn set_fail_stat(&self, fail: bool) {
        self.lock().fail_stat = fail;
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.lock();
        if state.fail_reads {
            return Err(anyhow!("injected read failure: {:?}", path));
        }
        match state.files.get(path) {
            Some(f) => String::from_utf8(f.content.clone())
                .map_err(|e| anyhow!("Invalid UTF-8: {}", e)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(anyhow!("injected write failure: {:?}", path));
        }
        let mtime = state.files.get(path).map(|f| f.mtime).unwrap_or(0.0);
        let torn = state.torn_writes;
        state.files.insert(
            path.to_path_buf(),
            MockFile {
                content: if torn { Vec::new() } else { contents.to_vec() },
                mtime,
            },
        );
        if torn {
            return Err(anyhow!("injected torn write: {:?}", path));
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.lock();
        let file = state
            .files
            .remove(from)
            .ok_or_else(|| anyhow!("File not found: {:?}", from))?;
        state.files.insert(to.to_path_buf(), file);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().files.contains_key(path)
    }

    fn modified_secs(&self, path: &Path) -> Result<Option<f64>> {
        let state = self.lock();
        if state.fail_stat {
            return Err(anyhow!("injected stat failure: {:?}", path));
        }
        Ok(state.files.get(path).map(|f| f.mtime))
    }
}
