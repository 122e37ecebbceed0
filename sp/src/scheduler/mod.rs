//! Scheduler abstraction and the stock scheduling strategies
//!
//! Every strategy implements [`Scheduler`]; schedulers that own a dedicated
//! thread are handed out as [`DisposableScheduler`].

mod current_thread;
mod event_loop;
mod handle;
mod immediate;
mod new_thread;
mod pool;
mod queue;
mod task_pool;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::error::Result;

pub use current_thread::CurrentThreadScheduler;
pub use event_loop::EventLoopScheduler;
pub use handle::ScheduledHandle;
pub use immediate::ImmediateScheduler;
pub use new_thread::NewThreadScheduler;
pub use pool::ThreadPoolScheduler;
pub use task_pool::TaskPoolScheduler;

/// A unit of work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run a job now, after a delay or at an absolute time
pub trait Scheduler: Send + Sync {
    /// The scheduler's notion of the current time
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Run `job` as soon as possible
    fn schedule(&self, job: Job) -> Result<ScheduledHandle> {
        self.schedule_after(Duration::ZERO, job)
    }

    /// Run `job` once `delay` has elapsed
    fn schedule_after(&self, delay: Duration, job: Job) -> Result<ScheduledHandle>;

    /// Run `job` at `due`; times in the past run as soon as possible
    fn schedule_at(&self, due: DateTime<Utc>, job: Job) -> Result<ScheduledHandle> {
        self.schedule_after(delay_until(self.now(), due), job)
    }
}

/// A scheduler that owns resources and must be released with [`dispose`](Self::dispose)
pub trait DisposableScheduler: Scheduler {
    /// Release the scheduler; repeated calls are no-ops
    fn dispose(&self) -> Result<()>;

    /// Whether disposal has been claimed
    fn is_disposed(&self) -> bool;
}

/// Generic conveniences on top of [`Scheduler`]
pub trait SchedulerExt: Scheduler {
    /// Schedule a closure without boxing it first
    fn schedule_fn<F>(&self, f: F) -> Result<ScheduledHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(Box::new(f))
    }

    /// Schedule `action` with `state` handed to it when it runs
    fn schedule_with<S, F>(&self, state: S, action: F) -> Result<ScheduledHandle>
    where
        S: Send + 'static,
        F: FnOnce(S) + Send + 'static,
    {
        self.schedule(Box::new(move || action(state)))
    }

    /// Delayed variant of [`schedule_with`](Self::schedule_with)
    fn schedule_with_after<S, F>(&self, state: S, delay: Duration, action: F) -> Result<ScheduledHandle>
    where
        S: Send + 'static,
        F: FnOnce(S) + Send + 'static,
    {
        self.schedule_after(delay, Box::new(move || action(state)))
    }

    /// Absolute-time variant of [`schedule_with`](Self::schedule_with)
    fn schedule_with_at<S, F>(&self, state: S, due: DateTime<Utc>, action: F) -> Result<ScheduledHandle>
    where
        S: Send + 'static,
        F: FnOnce(S) + Send + 'static,
    {
        self.schedule_at(due, Box::new(move || action(state)))
    }
}

impl<T: Scheduler + ?Sized> SchedulerExt for T {}

impl<T: Scheduler + ?Sized> Scheduler for Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn schedule(&self, job: Job) -> Result<ScheduledHandle> {
        (**self).schedule(job)
    }

    fn schedule_after(&self, delay: Duration, job: Job) -> Result<ScheduledHandle> {
        (**self).schedule_after(delay, job)
    }

    fn schedule_at(&self, due: DateTime<Utc>, job: Job) -> Result<ScheduledHandle> {
        (**self).schedule_at(due, job)
    }
}

impl<T: DisposableScheduler + ?Sized> DisposableScheduler for Arc<T> {
    fn dispose(&self) -> Result<()> {
        (**self).dispose()
    }

    fn is_disposed(&self) -> bool {
        (**self).is_disposed()
    }
}

/// Delays too long to represent saturate to roughly a century out
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `delay` from now as a monotonic deadline, saturating instead of overflowing
pub(crate) fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Delay from `now` until `due`, zero if `due` already passed
pub(crate) fn delay_until(now: DateTime<Utc>, due: DateTime<Utc>) -> Duration {
    (due - now).to_std().unwrap_or(Duration::ZERO)
}
