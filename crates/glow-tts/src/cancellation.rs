//! A generation-counter cancellation token.
//!
//! Bumping the epoch on `cancel()` and letting stale work silently discard
//! itself is a common enough pattern in this crate that it's worth an
//! explicit, clonable type every long-running operation can hold and poll,
//! rather than each caller rolling its own raw atomic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    epoch: Arc<AtomicU64>,
    observed: u64,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            epoch: Arc::new(AtomicU64::new(0)),
            observed: 0,
        }
    }

    /// A child token bound to the current epoch. Cancelling the parent
    /// (via `cancel`) cancels every child derived before that point.
    pub fn child(&self) -> Self {
        Self {
            epoch: Arc::clone(&self.epoch),
            observed: self.epoch.load(Ordering::Acquire),
        }
    }

    /// Bumps the epoch, cancelling this token and every child derived from it.
    pub fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_cancelled(&self) -> bool {
        self.epoch.load(Ordering::Acquire) != self.observed
    }
}
