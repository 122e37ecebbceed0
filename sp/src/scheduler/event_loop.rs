//! Dedicated-thread serial scheduler
//!
//! One background thread drains a private, time-ordered queue. Jobs never
//! overlap and run in due-time order, FIFO among jobs due at the same time.
//!
//! Shutdown is cooperative: [`EventLoopScheduler::shutdown`] marks the loop
//! stopped and discards pending work, and the thread exits once the job it is
//! running (if any) returns. [`EventLoopScheduler::shutdown_after_pending`]
//! enqueues that call as a sentinel job, so everything already queued ahead
//! of it still runs and the thread stops itself from inside its own context.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use super::queue::JobQueue;
use super::{Job, ScheduledHandle, Scheduler, deadline_after};
use crate::error::{Result, SchedulerError};
use crate::thread::ThreadFactory;

struct LoopState {
    queue: JobQueue,
    stopped: bool,
    exited: bool,
}

struct Shared {
    name: String,
    state: Mutex<LoopState>,
    wake: Condvar,
    executed: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A scheduler backed by exactly one dedicated thread
///
/// Cloning yields another handle to the same loop.
#[derive(Clone)]
pub struct EventLoopScheduler {
    shared: Arc<Shared>,
}

impl EventLoopScheduler {
    /// Start a loop on a thread named `name`
    pub fn named(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::with_factory(name.clone(), &ThreadFactory::named(name))
    }

    /// Start a loop on a thread built by `factory`
    ///
    /// `name` identifies the loop in logs and errors; the thread's OS name is
    /// whatever the factory assigns.
    pub fn with_factory(name: impl Into<String>, factory: &ThreadFactory) -> Result<Self> {
        let name = name.into();
        debug!(%name, factory = %factory.label(), "EventLoopScheduler::with_factory: called");

        let shared = Arc::new(Shared {
            name: name.clone(),
            state: Mutex::new(LoopState {
                queue: JobQueue::new(),
                stopped: false,
                exited: false,
            }),
            wake: Condvar::new(),
            executed: AtomicU64::new(0),
        });

        let worker = shared.clone();
        factory
            .spawn(Box::new(move || run(worker)))
            .map_err(|source| SchedulerError::Spawn {
                name: name.clone(),
                source,
            })?;

        info!(%name, "Event loop started");
        Ok(Self { shared })
    }

    /// Name of this loop
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Stop the loop after the job currently running, discarding pending jobs
    ///
    /// Safe to call from inside one of the loop's own jobs. Returns the number
    /// of jobs discarded; a second call discards nothing.
    pub fn shutdown(&self) -> usize {
        debug!(name = %self.shared.name, "EventLoopScheduler::shutdown: called");
        let discarded = {
            let mut state = self.shared.lock();
            state.stopped = true;
            state.queue.drain()
        };
        self.shared.wake.notify_all();

        let count = discarded.len();
        if count > 0 {
            debug!(name = %self.shared.name, count, "EventLoopScheduler::shutdown: discarded pending jobs");
        }
        // Captured values drop here, outside the lock
        drop(discarded);
        count
    }

    /// Enqueue the loop's own shutdown as the next job behind everything
    /// already due
    pub fn shutdown_after_pending(&self) -> Result<ScheduledHandle> {
        debug!(name = %self.shared.name, "EventLoopScheduler::shutdown_after_pending: called");
        let target = self.clone();
        self.schedule(Box::new(move || {
            target.shutdown();
        }))
    }

    /// Whether shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.shared.lock().stopped
    }

    /// Whether the loop thread has exited
    pub fn is_terminated(&self) -> bool {
        self.shared.lock().exited
    }

    /// Block until the loop thread exits or `timeout` elapses
    ///
    /// Returns whether the thread exited.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        let mut state = self.shared.lock();
        while !state.exited {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .wake
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Jobs waiting in the queue
    pub fn pending_jobs(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Jobs that have run to completion (or panicked) on the loop thread
    pub fn executed_jobs(&self) -> u64 {
        self.shared.executed.load(Ordering::Acquire)
    }
}

impl Scheduler for EventLoopScheduler {
    fn schedule_after(&self, delay: Duration, job: Job) -> Result<ScheduledHandle> {
        debug!(name = %self.shared.name, ?delay, "EventLoopScheduler::schedule_after: called");
        let (handle, cancelled) = {
            let mut state = self.shared.lock();
            if state.stopped {
                debug!(name = %self.shared.name, "EventLoopScheduler::schedule_after: rejected, loop stopped");
                return Err(SchedulerError::Shutdown {
                    name: self.shared.name.clone(),
                });
            }
            let handle = state.queue.push(deadline_after(delay), job);
            (handle, state.queue.take_cancelled())
        };
        self.shared.wake.notify_all();
        if !cancelled.is_empty() {
            debug!(
                name = %self.shared.name,
                count = cancelled.len(),
                "EventLoopScheduler::schedule_after: swept cancelled jobs"
            );
        }
        drop(cancelled);
        Ok(handle)
    }
}

impl std::fmt::Debug for EventLoopScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopScheduler")
            .field("name", &self.shared.name)
            .finish()
    }
}

fn run(shared: Arc<Shared>) {
    debug!(name = %shared.name, "event loop thread running");
    loop {
        let next = {
            let mut state = shared.lock();
            loop {
                if state.stopped {
                    break None;
                }
                let now = Instant::now();
                if let Some(job) = state.queue.pop_due(now) {
                    break Some(job);
                }
                state = match state.queue.next_due() {
                    Some(due) => {
                        shared
                            .wake
                            .wait_timeout(state, due - now)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0
                    }
                    None => shared.wake.wait(state).unwrap_or_else(PoisonError::into_inner),
                };
            }
        };

        let Some(job) = next else {
            break;
        };

        match catch_unwind(AssertUnwindSafe(|| job.run())) {
            Ok(true) => {
                shared.executed.fetch_add(1, Ordering::AcqRel);
            }
            Ok(false) => {
                debug!(name = %shared.name, "event loop skipped cancelled job");
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(name = %shared.name, %message, "Job panicked on event loop");
                shared.executed.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    shared.lock().exited = true;
    shared.wake.notify_all();
    info!(name = %shared.name, "Event loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_runs_on_named_thread() {
        let el = EventLoopScheduler::named("loop-under-test").expect("Failed to start loop");
        let (tx, rx) = mpsc::channel();

        el.schedule(Box::new(move || {
            let _ = tx.send(std::thread::current().name().map(str::to_string));
        }))
        .expect("schedule failed");

        assert_eq!(rx.recv_timeout(WAIT).expect("job did not run").as_deref(), Some("loop-under-test"));
        el.shutdown();
        assert!(el.await_termination(WAIT));
    }

    #[test]
    fn test_fifo_order() {
        let el = EventLoopScheduler::named("fifo").expect("Failed to start loop");
        let (tx, rx) = mpsc::channel();

        for i in 0..50 {
            let tx = tx.clone();
            el.schedule(Box::new(move || {
                let _ = tx.send(i);
            }))
            .expect("schedule failed");
        }

        let received: Vec<i32> = (0..50).map(|_| rx.recv_timeout(WAIT).expect("missing job")).collect();
        assert_eq!(received, (0..50).collect::<Vec<_>>());
        el.shutdown();
    }

    #[test]
    fn test_delayed_job_runs_after_immediate() {
        let el = EventLoopScheduler::named("delays").expect("Failed to start loop");
        let (tx, rx) = mpsc::channel();

        let slow = tx.clone();
        el.schedule_after(
            Duration::from_millis(30),
            Box::new(move || {
                let _ = slow.send("delayed");
            }),
        )
        .expect("schedule failed");
        el.schedule(Box::new(move || {
            let _ = tx.send("now");
        }))
        .expect("schedule failed");

        assert_eq!(rx.recv_timeout(WAIT).expect("missing job"), "now");
        assert_eq!(rx.recv_timeout(WAIT).expect("missing job"), "delayed");
        el.shutdown();
    }

    #[test]
    fn test_schedule_after_shutdown_is_rejected() {
        let el = EventLoopScheduler::named("closed").expect("Failed to start loop");
        el.shutdown();

        let err = el.schedule(Box::new(|| {})).expect_err("schedule should fail");
        assert!(err.is_shutdown());
        assert!(el.await_termination(WAIT));
        assert!(el.is_terminated());
    }

    #[test]
    fn test_shutdown_after_pending_runs_queued_work_first() {
        let el = EventLoopScheduler::named("drain").expect("Failed to start loop");
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();

        el.schedule(Box::new(move || {
            let _ = release_rx.recv_timeout(WAIT);
            let _ = done_tx.send("blocking job finished");
        }))
        .expect("schedule failed");

        el.shutdown_after_pending().expect("sentinel rejected");
        assert!(!el.is_terminated());

        release_tx.send(()).expect("release failed");
        assert_eq!(done_rx.recv_timeout(WAIT).expect("job lost"), "blocking job finished");
        assert!(el.await_termination(WAIT));
    }

    #[test]
    fn test_huge_delay_is_accepted() {
        let el = EventLoopScheduler::named("far-future").expect("Failed to start loop");
        let (tx, rx) = mpsc::channel();

        el.schedule_after(Duration::MAX, Box::new(|| {})).expect("schedule failed");
        el.schedule(Box::new(move || {
            let _ = tx.send("loop still running");
        }))
        .expect("schedule failed");

        assert_eq!(rx.recv_timeout(WAIT).expect("loop stalled"), "loop still running");
        assert_eq!(el.pending_jobs(), 1);
        assert!(!el.await_termination(Duration::from_millis(10)));
        el.shutdown();
        assert!(el.await_termination(Duration::MAX));
    }

    #[test]
    fn test_panicking_job_keeps_loop_alive() {
        let el = EventLoopScheduler::named("panics").expect("Failed to start loop");
        let (tx, rx) = mpsc::channel();

        el.schedule(Box::new(|| panic!("job failure"))).expect("schedule failed");
        el.schedule(Box::new(move || {
            let _ = tx.send("still running");
        }))
        .expect("schedule failed");

        assert_eq!(rx.recv_timeout(WAIT).expect("loop died"), "still running");
        el.shutdown();
    }

    #[test]
    fn test_cancelled_job_skipped() {
        let el = EventLoopScheduler::named("cancel").expect("Failed to start loop");
        let (tx, rx) = mpsc::channel();

        let cancelled_tx = tx.clone();
        let handle = el
            .schedule_after(
                Duration::from_millis(50),
                Box::new(move || {
                    let _ = cancelled_tx.send("cancelled");
                }),
            )
            .expect("schedule failed");
        handle.cancel();
        el.schedule_after(
            Duration::from_millis(80),
            Box::new(move || {
                let _ = tx.send("kept");
            }),
        )
        .expect("schedule failed");

        assert_eq!(rx.recv_timeout(WAIT).expect("missing job"), "kept");
        el.shutdown();
    }

    #[test]
    fn test_cancelled_timeouts_do_not_accumulate() {
        let el = EventLoopScheduler::named("timeouts").expect("Failed to start loop");

        for _ in 0..5_000 {
            el.schedule_after(Duration::from_secs(3600), Box::new(|| {}))
                .expect("schedule failed")
                .cancel();
        }

        assert!(el.pending_jobs() <= 128, "queue grew to {}", el.pending_jobs());
        el.shutdown();
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let factory = ThreadFactory::new("broken", |_start| Err(std::io::Error::other("refused")));
        let err = EventLoopScheduler::with_factory("never", &factory).expect_err("spawn should fail");
        assert!(matches!(err, SchedulerError::Spawn { ref name, .. } if name == "never"));
    }
}
