//! Time-ordered job queue shared by the trampoline and event loop schedulers

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use super::{Job, ScheduledHandle};

/// A job waiting for its due time
pub(crate) struct TimedJob {
    pub due: Instant,
    pub seq: u64,
    pub handle: ScheduledHandle,
    pub job: Job,
}

impl TimedJob {
    /// Run the job unless it was cancelled; returns whether it ran
    pub fn run(self) -> bool {
        if self.handle.is_cancelled() {
            return false;
        }
        (self.job)();
        true
    }
}

impl Eq for TimedJob {}

impl PartialEq for TimedJob {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Ord for TimedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest due first, then earliest submission
        other.due.cmp(&self.due).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Queue size below which cancelled jobs are left for `pop` to skip
const MIN_COMPACT_LEN: usize = 64;

/// Min-heap of [`TimedJob`] with FIFO tie-breaking
pub(crate) struct JobQueue {
    heap: BinaryHeap<TimedJob>,
    next_seq: u64,
    compact_at: usize,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            compact_at: MIN_COMPACT_LEN,
        }
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove cancelled jobs once the queue has doubled since the last sweep
    ///
    /// Returns the removed jobs so the caller can drop them outside any lock.
    /// Amortized over pushes this stays constant time, and a queue that is
    /// mostly cancelled never grows past twice its live size.
    pub fn take_cancelled(&mut self) -> Vec<TimedJob> {
        if self.heap.len() < self.compact_at {
            return Vec::new();
        }
        let (cancelled, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .partition(|job| job.handle.is_cancelled());
        self.heap = BinaryHeap::from(live);
        self.compact_at = (self.heap.len() * 2).max(MIN_COMPACT_LEN);
        cancelled
    }

    /// Enqueue `job` for `due`, returning its cancellation handle
    pub fn push(&mut self, due: Instant, job: Job) -> ScheduledHandle {
        let handle = ScheduledHandle::new();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimedJob {
            due,
            seq,
            handle: handle.clone(),
            job,
        });
        handle
    }

    /// Due time of the next job, if any
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|j| j.due)
    }

    /// Remove the next job regardless of its due time
    pub fn pop(&mut self) -> Option<TimedJob> {
        self.heap.pop()
    }

    /// Remove the next job if it is due at `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<TimedJob> {
        if self.next_due()? <= now { self.heap.pop() } else { None }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Take every pending job out of the queue
    pub fn drain(&mut self) -> Vec<TimedJob> {
        self.heap.drain().collect()
    }
}
