//! New-thread-per-job scheduler

use std::time::Duration;

use tracing::debug;

use super::{Job, ScheduledHandle, Scheduler};
use crate::error::{Result, SchedulerError};
use crate::thread::ThreadFactory;

/// Runs every job on a fresh thread from its [`ThreadFactory`]
///
/// Threads are detached and end with their job, so there is nothing for the
/// caller to release.
#[derive(Debug, Clone)]
pub struct NewThreadScheduler {
    factory: ThreadFactory,
}

impl NewThreadScheduler {
    pub fn new(factory: ThreadFactory) -> Self {
        debug!(factory = %factory.label(), "NewThreadScheduler::new: called");
        Self { factory }
    }

    /// Threads named exactly `name`
    pub fn named(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(SchedulerError::InvalidArgument("thread name must not be empty".to_string()));
        }
        Ok(Self::new(ThreadFactory::named(name)))
    }

    pub fn factory(&self) -> &ThreadFactory {
        &self.factory
    }
}

impl Scheduler for NewThreadScheduler {
    fn schedule_after(&self, delay: Duration, job: Job) -> Result<ScheduledHandle> {
        debug!(factory = %self.factory.label(), ?delay, "NewThreadScheduler::schedule_after: called");
        let handle = ScheduledHandle::new();
        let token = handle.clone();

        self.factory
            .spawn(Box::new(move || {
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                if !token.is_cancelled() {
                    job();
                }
            }))
            .map_err(|source| SchedulerError::Spawn {
                name: self.factory.label().to_string(),
                source,
            })?;

        Ok(handle)
    }
}
