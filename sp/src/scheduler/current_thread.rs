//! Current-thread trampoline scheduler

use std::cell::RefCell;
use std::time::{Duration, Instant};

use tracing::debug;

use super::queue::JobQueue;
use super::{Job, ScheduledHandle, Scheduler, deadline_after};
use crate::error::Result;

thread_local! {
    static TRAMPOLINE: RefCell<Option<JobQueue>> = const { RefCell::new(None) };
}

/// Queues work on the calling thread
///
/// The outermost `schedule*` call on a thread runs the job and then drains
/// everything scheduled from inside it, in due-time order. Nested calls only
/// enqueue, so recursion turns into iteration.
#[derive(Debug, Default, Clone, Copy)]
pub struct CurrentThreadScheduler;

impl CurrentThreadScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Whether a trampoline is currently draining on this thread
    pub fn is_schedule_required() -> bool {
        TRAMPOLINE.with(|t| t.borrow().is_none())
    }

    fn drain() {
        let _reset = TrampolineReset;
        loop {
            let next = TRAMPOLINE.with(|t| t.borrow_mut().as_mut().and_then(JobQueue::pop));
            let Some(next) = next else {
                break;
            };
            if next.handle.is_cancelled() {
                continue;
            }
            let now = Instant::now();
            if next.due > now {
                std::thread::sleep(next.due - now);
            }
            next.run();
        }
    }
}

/// Uninstalls the trampoline when draining ends, including by panic
struct TrampolineReset;

impl Drop for TrampolineReset {
    fn drop(&mut self) {
        TRAMPOLINE.with(|t| t.borrow_mut().take());
    }
}

impl Scheduler for CurrentThreadScheduler {
    fn schedule_after(&self, delay: Duration, job: Job) -> Result<ScheduledHandle> {
        debug!(?delay, "CurrentThreadScheduler::schedule_after: called");
        let due = deadline_after(delay);

        let (handle, owner) = TRAMPOLINE.with(|t| {
            let mut slot = t.borrow_mut();
            let owner = slot.is_none();
            let queue = slot.get_or_insert_with(JobQueue::new);
            (queue.push(due, job), owner)
        });

        if owner {
            debug!("CurrentThreadScheduler::schedule_after: draining trampoline");
            Self::drain();
        }
        Ok(handle)
    }
}
