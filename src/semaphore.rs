//! Non-blocking permit pool gating the flush pipeline.
//!
//! A fixed number of permits with try-only acquisition. Every successful
//! [`Semaphore::try_lock`] must be paired with exactly one
//! [`Semaphore::unlock`]. Shutdown uses the [`Semaphore::idle`] probe to
//! wait for in-flight work without taking a permit itself.

use std::sync::atomic::{AtomicUsize, Ordering};

/// A fixed-capacity permit pool with non-blocking acquisition.
pub struct Semaphore {
    permits: AtomicUsize,
    capacity: usize,
}

impl Semaphore {
    /// Creates a pool holding `capacity` permits.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: AtomicUsize::new(capacity),
            capacity,
        }
    }

    /// Attempts to take one permit. Returns `true` when a permit was
    /// acquired; the caller then owes one matching `unlock`.
    pub fn try_lock(&self) -> bool {
        self.permits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| p.checked_sub(1))
            .is_ok()
    }

    /// Returns a previously acquired permit. Must be called exactly once
    /// per successful `try_lock`.
    pub fn unlock(&self) {
        let previous = self.permits.fetch_add(1, Ordering::AcqRel);
        debug_assert!(previous < self.capacity, "unlock without matching try_lock");
    }

    /// Whether every permit is currently available.
    pub fn idle(&self) -> bool {
        self.permits.load(Ordering::Acquire) == self.capacity
    }
}
