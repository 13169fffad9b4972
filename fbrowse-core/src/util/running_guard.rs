//! src/util/running_guard.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clears a worker's running flag when dropped, so a task that unwinds
/// leaves its worker startable again.
pub struct RunningGuard {
    flag: Arc<AtomicBool>,
}

impl RunningGuard {
    #[must_use]
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    /// Clear the flag now, ahead of the guard going out of scope.
    pub fn release(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.release();
    }
}
