//! Cancellation handle returned by every schedule call

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Best-effort cancellation token for one scheduled job
///
/// Cancelling before the job starts prevents it from running. Cancelling a
/// job that already started has no effect on that execution.
#[derive(Debug, Clone, Default)]
pub struct ScheduledHandle {
    cancelled: Arc<AtomicBool>,
}

impl ScheduledHandle {
    /// Create a fresh, uncancelled handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
