//! Deterministic schedulers for tests
//!
//! [`TestScheduler`] runs on a virtual clock that only moves when the test
//! advances it. [`TestSchedulerProvider`] hands that one scheduler out for
//! every strategy and counts the event loops it creates and disposes.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::disposing::DisposingScheduler;
use crate::error::Result;
use crate::provider::{SchedulerProvider, validate_name};
use crate::scheduler::{DisposableScheduler, Job, ScheduledHandle, Scheduler};
use crate::thread::ThreadFactory;

struct VirtualJob {
    due: DateTime<Utc>,
    seq: u64,
    handle: ScheduledHandle,
    job: Job,
}

impl Eq for VirtualJob {}

impl PartialEq for VirtualJob {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Ord for VirtualJob {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.due.cmp(&self.due).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for VirtualJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

fn add_delay(time: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| time.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

struct VirtualState {
    clock: DateTime<Utc>,
    queue: BinaryHeap<VirtualJob>,
    next_seq: u64,
}

/// Virtual-time scheduler; nothing runs until the clock is advanced
#[derive(Clone)]
pub struct TestScheduler {
    state: Arc<Mutex<VirtualState>>,
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::starting_at(DateTime::<Utc>::default())
    }
}

impl TestScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual clock starts at `start`
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(VirtualState {
                clock: start,
                queue: BinaryHeap::new(),
                next_seq: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run everything due up to `time`, then set the clock to `time`
    ///
    /// Returns the number of jobs run. Jobs scheduled by running jobs are
    /// included if they fall due before `time`.
    pub fn advance_to(&self, time: DateTime<Utc>) -> usize {
        debug!(%time, "TestScheduler::advance_to: called");
        let mut ran = 0;
        loop {
            let next = {
                let mut state = self.lock();
                match state.queue.peek().map(|job| job.due) {
                    Some(due) if due <= time => {
                        if due > state.clock {
                            state.clock = due;
                        }
                        state.queue.pop()
                    }
                    _ => None,
                }
            };
            let Some(next) = next else {
                break;
            };
            if !next.handle.is_cancelled() {
                (next.job)();
                ran += 1;
            }
        }

        let mut state = self.lock();
        if time > state.clock {
            state.clock = time;
        }
        ran
    }

    /// Advance the clock by `delta`
    pub fn advance_by(&self, delta: Duration) -> usize {
        self.advance_to(add_delay(self.now(), delta))
    }

    /// Run until the queue is empty, jumping the clock as needed
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let next_due = self.lock().queue.peek().map(|job| job.due);
            match next_due {
                Some(due) => ran += self.advance_to(due),
                None => return ran,
            }
        }
    }

    /// Jobs waiting on the virtual clock
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }
}

impl Scheduler for TestScheduler {
    fn now(&self) -> DateTime<Utc> {
        self.lock().clock
    }

    fn schedule_after(&self, delay: Duration, job: Job) -> Result<ScheduledHandle> {
        let handle = ScheduledHandle::new();
        let mut state = self.lock();
        let due = add_delay(state.clock, delay);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(VirtualJob {
            due,
            seq,
            handle: handle.clone(),
            job,
        });
        Ok(handle)
    }
}

#[derive(Default)]
struct LoopCounts {
    created: AtomicUsize,
    disposed: AtomicUsize,
}

/// Provider that substitutes one [`TestScheduler`] for every strategy
#[derive(Clone, Default)]
pub struct TestSchedulerProvider {
    scheduler: Arc<TestScheduler>,
    counts: Arc<LoopCounts>,
}

impl TestSchedulerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The scheduler handed out by every accessor
    pub fn scheduler(&self) -> &TestScheduler {
        &self.scheduler
    }

    /// Event loops handed out so far
    pub fn event_loops_created(&self) -> usize {
        self.counts.created.load(Ordering::SeqCst)
    }

    /// Event loops disposed so far
    pub fn event_loops_disposed(&self) -> usize {
        self.counts.disposed.load(Ordering::SeqCst)
    }

    fn shared(&self) -> Arc<dyn Scheduler> {
        self.scheduler.clone()
    }

    fn event_loop(&self, name: String) -> Arc<dyn DisposableScheduler> {
        self.counts.created.fetch_add(1, Ordering::SeqCst);
        let counts = self.counts.clone();
        Arc::new(DisposingScheduler::new(name, (*self.scheduler).clone(), move |_| {
            counts.disposed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }
}

impl SchedulerProvider for TestSchedulerProvider {
    fn immediate(&self) -> Arc<dyn Scheduler> {
        self.shared()
    }

    fn current_thread(&self) -> Arc<dyn Scheduler> {
        self.shared()
    }

    fn new_thread(&self) -> Arc<dyn Scheduler> {
        self.shared()
    }

    fn thread_pool(&self) -> Arc<dyn Scheduler> {
        self.shared()
    }

    fn task_pool(&self) -> Arc<dyn Scheduler> {
        self.shared()
    }

    fn default_scheduler(&self) -> Arc<dyn Scheduler> {
        self.shared()
    }

    fn new_named_thread(&self, name: &str) -> Result<Arc<dyn Scheduler>> {
        validate_name(name)?;
        Ok(self.shared())
    }

    fn new_named_thread_with(&self, _factory: ThreadFactory) -> Result<Arc<dyn Scheduler>> {
        Ok(self.shared())
    }

    fn new_event_loop(&self) -> Result<Arc<dyn DisposableScheduler>> {
        let n = self.event_loops_created() + 1;
        Ok(self.event_loop(format!("test-loop-{}", n)))
    }

    fn new_event_loop_named(&self, name: &str) -> Result<Arc<dyn DisposableScheduler>> {
        let name = validate_name(name)?;
        Ok(self.event_loop(name))
    }

    fn new_event_loop_with(&self, factory: ThreadFactory) -> Result<Arc<dyn DisposableScheduler>> {
        Ok(self.event_loop(factory.label().to_string()))
    }
}
