//! Cooperative cancellation.
//!
//! A [`CancelToken`] is shared between whoever requests a stop and the
//! workers honoring it. Workers check it at safe checkpoints (between
//! pipeline steps, between chunk dispatches); an in-flight provider call
//! is always allowed to finish.

use crate::error::EngineError;
use std::sync::Arc;
use tokio::sync::watch;

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

    /// Request cancellation and wake all waiters. Idempotent.
    pub fn request(&self) {
        if !self.tx.send_replace(true) {
            tracing::debug!("cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // wait_for inspects the current value first, so a request that
        // happened before this call is never missed.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Checkpoint for cooperative workers: `Err(Cancelled)` once a stop
    /// has been requested, `Ok` otherwise.
    pub fn checkpoint(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
