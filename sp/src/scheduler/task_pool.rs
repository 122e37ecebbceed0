//! Task pool scheduler backed by a Tokio runtime

use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, warn};

use super::{Job, ScheduledHandle, Scheduler};
use crate::error::{Result, SchedulerError};

/// Dispatches jobs onto a Tokio runtime's blocking pool
///
/// Delays are timed with `tokio::time::sleep`; the job itself runs through
/// `spawn_blocking` so long jobs never stall the async workers.
pub struct TaskPoolScheduler {
    handle: Handle,
    runtime: Option<Runtime>,
}

impl TaskPoolScheduler {
    /// Build and own a multi-thread runtime with `threads` workers
    pub fn new(thread_name: &str, threads: usize) -> Result<Self> {
        debug!(%thread_name, threads, "TaskPoolScheduler::new: called");
        if threads == 0 {
            return Err(SchedulerError::InvalidArgument("task pool needs at least 1 thread".to_string()));
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name(thread_name)
            .enable_time()
            .build()
            .map_err(SchedulerError::Runtime)?;

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Dispatch onto an existing runtime the caller keeps alive
    pub fn from_handle(handle: Handle) -> Self {
        debug!("TaskPoolScheduler::from_handle: called");
        Self { handle, runtime: None }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Scheduler for TaskPoolScheduler {
    fn schedule_after(&self, delay: Duration, job: Job) -> Result<ScheduledHandle> {
        debug!(?delay, "TaskPoolScheduler::schedule_after: called");
        let handle = ScheduledHandle::new();
        let token = handle.clone();

        self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if token.is_cancelled() {
                return;
            }
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                warn!(error = %e, "Task pool job failed");
            }
        });

        Ok(handle)
    }
}

impl Drop for TaskPoolScheduler {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            debug!("TaskPoolScheduler::drop: shutting down owned runtime");
            // Non-blocking, so dropping from async code is fine
            runtime.shutdown_background();
        }
    }
}
