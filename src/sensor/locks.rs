// src/sensor/locks.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Registry of one mutex per watched key.
///
/// The cursor store does not make get-then-set atomic, so every poll holds
/// its key's lock for the whole read-compare-write section.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `key`, created on first use.
    pub fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}

/// Acquire a key lock. A poisoned lock only means an earlier poll panicked;
/// the guarded data is `()`, so it is safe to keep going.
pub(crate) fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}
