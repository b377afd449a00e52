//! Binary semaphore guarding durable read-modify-write sequences.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared async binary semaphore.
///
/// Clones share the same permit. Hold it across the whole read-modify-write
/// of a durable counter so that concurrent writers never interleave.
#[derive(Debug, Clone, Default)]
pub struct BinarySemaphore {
    permit: Arc<Mutex<()>>,
}

impl BinarySemaphore {
    /// Creates a semaphore with its single permit available.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `operation` while holding the permit.
    pub async fn with_permit<F, Fut, T>(&self, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.permit.lock().await;
        operation().await
    }

    /// Returns whether the permit is currently held.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.permit.try_lock().is_err()
    }
}
