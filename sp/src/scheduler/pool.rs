//! Shared worker pool scheduler

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::debug;

use super::{EventLoopScheduler, Job, ScheduledHandle, Scheduler};
use crate::error::{Result, SchedulerError};

/// Fixed set of event loops with round-robin dispatch
///
/// Jobs on the same worker are serial; jobs on different workers run in
/// parallel. The workers shut down when the pool is dropped.
pub struct ThreadPoolScheduler {
    workers: Vec<EventLoopScheduler>,
    next: AtomicUsize,
}

impl ThreadPoolScheduler {
    /// Start `size` workers named `<prefix>-pool-<n>`
    pub fn new(prefix: &str, size: usize) -> Result<Self> {
        debug!(%prefix, size, "ThreadPoolScheduler::new: called");
        if size == 0 {
            return Err(SchedulerError::InvalidArgument("worker pool size must be at least 1".to_string()));
        }

        let mut workers = Vec::with_capacity(size);
        for n in 1..=size {
            match EventLoopScheduler::named(format!("{}-pool-{}", prefix, n)) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    for started in &workers {
                        started.shutdown();
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            workers,
            next: AtomicUsize::new(0),
        })
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    fn pick(&self) -> &EventLoopScheduler {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        &self.workers[n % self.workers.len()]
    }
}

impl Scheduler for ThreadPoolScheduler {
    fn schedule_after(&self, delay: Duration, job: Job) -> Result<ScheduledHandle> {
        let worker = self.pick();
        debug!(worker = %worker.name(), ?delay, "ThreadPoolScheduler::schedule_after: called");
        worker.schedule_after(delay, job)
    }
}

impl Drop for ThreadPoolScheduler {
    fn drop(&mut self) {
        debug!(size = self.workers.len(), "ThreadPoolScheduler::drop: shutting down workers");
        for worker in &self.workers {
            worker.shutdown();
        }
    }
}
