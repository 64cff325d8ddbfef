// src/engine/cancel.rs

//! Cooperative cancellation for the active run.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable cancellation flag.
///
/// The executor checks it at node boundaries only; a node that is already
/// running finishes its current attempt.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only errors if the
        // token is dropped mid-await, which cannot happen here.
        let _ = rx.wait_for(|c| *c).await;
    }
}
