//! Run-now scheduler

use std::time::Duration;

use tracing::debug;

use super::{Job, ScheduledHandle, Scheduler};
use crate::error::Result;

/// Runs every job synchronously on the calling thread
///
/// A delayed job blocks the caller for the delay before running.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl ImmediateScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for ImmediateScheduler {
    fn schedule_after(&self, delay: Duration, job: Job) -> Result<ScheduledHandle> {
        debug!(?delay, "ImmediateScheduler::schedule_after: called");
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        job();
        Ok(ScheduledHandle::new())
    }
}
