//! Bounded pool of in-flight call permits.
//!
//! Caps how many provider calls run simultaneously across the whole
//! process. Acquisition is scoped: the returned permit releases its slot
//! on drop, on every exit path, so slots can never leak.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::{DispatchContext, DispatchError};

/// Counters snapshot for observability.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SlotStatus {
    pub active: usize,
    pub available: usize,
    pub max_slots: usize,
}

/// Bounded pool of concurrency slots shared by all agents.
#[derive(Debug)]
pub struct ConcurrencySlots {
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    max_slots: usize,
}

/// RAII slot: dropping it frees the slot.
#[derive(Debug)]
pub struct SlotPermit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencySlots {
    pub fn new(max_slots: usize) -> Self {
        let max_slots = max_slots.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_slots)),
            active: Arc::new(AtomicUsize::new(0)),
            max_slots,
        }
    }

    /// Wait for a free slot and mark it in use.
    ///
    /// Aborts with `Cancelled`/`DeadlineExceeded` from the context instead
    /// of queueing past the caller's bound.
    pub async fn acquire(&self, ctx: &DispatchContext) -> Result<SlotPermit, DispatchError> {
        let permit = ctx
            .run(Arc::clone(&self.semaphore).acquire_owned())
            .await?
            .expect("slot semaphore is never closed");

        self.active.fetch_add(1, Ordering::SeqCst);
        debug!(active = self.active(), max = self.max_slots, "concurrency slot acquired");
        Ok(SlotPermit {
            _permit: permit,
            active: Arc::clone(&self.active),
        })
    }

    /// Number of slots currently in use.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    pub fn status(&self) -> SlotStatus {
        SlotStatus {
            active: self.active(),
            available: self.available(),
            max_slots: self.max_slots,
        }
    }
}
