//! DisposingScheduler - one-shot, race-free teardown for dedicated schedulers
//!
//! Wraps a scheduler together with the teardown action that releases it.
//! `dispose()` claims a single atomic flag; only the caller that flips it runs
//! the teardown, every other caller returns immediately. A teardown that fails
//! (returns an error or panics) releases the claim again so disposal can be
//! retried.
//!
//! Retrying is only as safe as the teardown action. The provider's teardown
//! merely enqueues a shutdown sentinel, so a failed attempt leaves the loop
//! untouched; caller-supplied teardowns should be safe to invoke again.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{Result, SchedulerError};
use crate::scheduler::{DisposableScheduler, Job, ScheduledHandle, Scheduler};

/// Teardown action bound to the wrapped scheduler
pub type Teardown<S> = Box<dyn Fn(&S) -> Result<()> + Send + Sync>;

/// Scheduler wrapper that owns the disposal state machine
pub struct DisposingScheduler<S: Scheduler> {
    name: String,
    inner: S,
    teardown: Teardown<S>,
    disposed: AtomicBool,
}

/// Releases a claimed disposal unless the teardown succeeded
struct ClaimGuard<'a> {
    disposed: &'a AtomicBool,
    committed: bool,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.disposed.store(false, Ordering::Release);
        }
    }
}

impl<S: Scheduler> DisposingScheduler<S> {
    /// Wrap `inner`; `teardown` runs on the first successful `dispose()`
    pub fn new<F>(name: impl Into<String>, inner: S, teardown: F) -> Self
    where
        F: Fn(&S) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(%name, "DisposingScheduler::new: called");
        Self {
            name,
            inner,
            teardown: Box::new(teardown),
            disposed: AtomicBool::new(false),
        }
    }

    /// Builder that validates its collaborators at `build()` time
    pub fn builder() -> DisposingSchedulerBuilder<S> {
        DisposingSchedulerBuilder::default()
    }

    /// Name used in logs and errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped scheduler
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn try_dispose(&self) -> Result<()> {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(name = %self.name, "DisposingScheduler::dispose: already disposed");
            return Ok(());
        }

        debug!(name = %self.name, "DisposingScheduler::dispose: claimed, running teardown");
        let mut guard = ClaimGuard {
            disposed: &self.disposed,
            committed: false,
        };

        match (self.teardown)(&self.inner) {
            Ok(()) => {
                guard.committed = true;
                info!(name = %self.name, "Scheduler disposed");
                Ok(())
            }
            Err(e) => {
                warn!(name = %self.name, error = %e, "Teardown failed, disposal rolled back");
                Err(SchedulerError::Teardown {
                    scheduler: self.name.clone(),
                    source: Box::new(e),
                })
            }
        }
    }
}

impl<S: Scheduler> Scheduler for DisposingScheduler<S> {
    fn now(&self) -> DateTime<Utc> {
        self.inner.now()
    }

    fn schedule(&self, job: Job) -> Result<ScheduledHandle> {
        self.inner.schedule(job)
    }

    fn schedule_after(&self, delay: Duration, job: Job) -> Result<ScheduledHandle> {
        self.inner.schedule_after(delay, job)
    }

    fn schedule_at(&self, due: DateTime<Utc>, job: Job) -> Result<ScheduledHandle> {
        self.inner.schedule_at(due, job)
    }
}

impl<S: Scheduler> DisposableScheduler for DisposingScheduler<S> {
    fn dispose(&self) -> Result<()> {
        self.try_dispose()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl<S: Scheduler> Drop for DisposingScheduler<S> {
    fn drop(&mut self) {
        if self.is_disposed() {
            return;
        }
        if std::thread::panicking() {
            warn!(name = %self.name, "Dropped undisposed while unwinding, skipping teardown");
            return;
        }
        debug!(name = %self.name, "DisposingScheduler::drop: disposing undisposed scheduler");
        match catch_unwind(AssertUnwindSafe(|| self.try_dispose())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(name = %self.name, error = %e, "Dispose on drop failed"),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(name = %self.name, %message, "Teardown panicked during drop");
            }
        }
    }
}

impl<S: Scheduler> fmt::Debug for DisposingScheduler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposingScheduler")
            .field("name", &self.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Builder for [`DisposingScheduler`]
pub struct DisposingSchedulerBuilder<S: Scheduler> {
    name: Option<String>,
    scheduler: Option<S>,
    teardown: Option<Teardown<S>>,
}

impl<S: Scheduler> Default for DisposingSchedulerBuilder<S> {
    fn default() -> Self {
        Self {
            name: None,
            scheduler: None,
            teardown: None,
        }
    }
}

impl<S: Scheduler> DisposingSchedulerBuilder<S> {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn scheduler(mut self, scheduler: S) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn teardown<F>(mut self, teardown: F) -> Self
    where
        F: Fn(&S) -> Result<()> + Send + Sync + 'static,
    {
        self.teardown = Some(Box::new(teardown));
        self
    }

    /// Fails with `InvalidArgument` if the scheduler or teardown is missing
    pub fn build(self) -> Result<DisposingScheduler<S>> {
        let scheduler = self
            .scheduler
            .ok_or_else(|| SchedulerError::InvalidArgument("scheduler is required".to_string()))?;
        let teardown = self
            .teardown
            .ok_or_else(|| SchedulerError::InvalidArgument("teardown action is required".to_string()))?;
        let name = self.name.unwrap_or_else(|| "scheduler".to_string());

        debug!(%name, "DisposingSchedulerBuilder::build: called");
        Ok(DisposingScheduler {
            name,
            inner: scheduler,
            teardown,
            disposed: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ImmediateScheduler;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn counting(count: Arc<AtomicUsize>) -> DisposingScheduler<ImmediateScheduler> {
        DisposingScheduler::new("counting", ImmediateScheduler::new(), move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_second_dispose_is_noop() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = counting(count.clone());

        assert!(!scheduler.is_disposed());
        scheduler.dispose().expect("first dispose failed");
        scheduler.dispose().expect("second dispose failed");

        assert!(scheduler.is_disposed());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_teardown_rolls_back() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let scheduler = DisposingScheduler::new("flaky", ImmediateScheduler::new(), move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SchedulerError::Shutdown {
                    name: "flaky".to_string(),
                })
            } else {
                Ok(())
            }
        });

        let err = scheduler.dispose().expect_err("first teardown should fail");
        assert!(err.is_retryable());
        assert!(!scheduler.is_disposed());

        scheduler.dispose().expect("retry failed");
        assert!(scheduler.is_disposed());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_teardown_rolls_back() {
        let scheduler = DisposingScheduler::new("panicky", ImmediateScheduler::new(), |_| panic!("teardown exploded"));

        let result = catch_unwind(AssertUnwindSafe(|| scheduler.dispose()));
        assert!(result.is_err());
        assert!(!scheduler.is_disposed());
    }

    #[test]
    fn test_drop_survives_panicking_teardown() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let scheduler = DisposingScheduler::new("panics-on-drop", ImmediateScheduler::new(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("teardown exploded")
        });

        drop(scheduler);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_while_unwinding_skips_teardown() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result = catch_unwind(AssertUnwindSafe(move || {
            let _scheduler = DisposingScheduler::new("unwinding", ImmediateScheduler::new(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                panic!("teardown exploded")
            });
            panic!("caller failure");
        }));

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_disposes_once() {
        let count = Arc::new(AtomicUsize::new(0));
        drop(counting(count.clone()));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let scheduler = counting(count.clone());
        scheduler.dispose().expect("dispose failed");
        drop(scheduler);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_schedule_passes_through() {
        let scheduler = counting(Arc::new(AtomicUsize::new(0)));
        let (tx, rx) = std::sync::mpsc::channel();

        scheduler
            .schedule(Box::new(move || {
                let _ = tx.send("through");
            }))
            .expect("schedule failed");

        assert_eq!(rx.recv().expect("job did not run"), "through");
    }

    #[test]
    fn test_builder_requires_scheduler() {
        let err = DisposingScheduler::<ImmediateScheduler>::builder()
            .teardown(|_| Ok(()))
            .build()
            .expect_err("missing scheduler accepted");
        assert!(matches!(err, SchedulerError::InvalidArgument(ref m) if m.contains("scheduler")));
    }

    #[test]
    fn test_builder_requires_teardown() {
        let err = DisposingScheduler::builder()
            .scheduler(ImmediateScheduler::new())
            .build()
            .expect_err("missing teardown accepted");
        assert!(matches!(err, SchedulerError::InvalidArgument(ref m) if m.contains("teardown")));
    }

    #[test]
    fn test_builder_builds() {
        let scheduler = DisposingScheduler::builder()
            .name("built")
            .scheduler(ImmediateScheduler::new())
            .teardown(|_| Ok(()))
            .build()
            .expect("build failed");
        assert_eq!(scheduler.name(), "built");
        scheduler.dispose().expect("dispose failed");
    }
}
