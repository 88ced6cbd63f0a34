//! Fetch-slot pool bounding concurrent attempts.
//!
//! A slot is held for the duration of one attempt, not a whole retry loop,
//! so jobs waiting out a backoff delay do not occupy a slot.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Shared slot pool. At every instant the number of held slots is at most
/// the configured maximum.
#[derive(Debug, Clone)]
pub struct FetchSlots {
    sem: Arc<Semaphore>,
}

impl FetchSlots {
    /// Creates a pool with the given maximum (clamped to at least 1).
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Waits until a slot is free and takes it. Dropping the guard releases
    /// the slot.
    pub async fn acquire(&self) -> SlotGuard {
        let permit = Arc::clone(&self.sem)
            .acquire_owned()
            .await
            .expect("slot semaphore closed");
        SlotGuard { _permit: permit }
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}

/// RAII guard for one fetch slot.
#[derive(Debug)]
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
}
