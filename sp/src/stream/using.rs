//! UsingEventLoop - scope a dedicated scheduler to one subscription
//!
//! Each subscription acquires its own event loop, builds the real stream on
//! it, and disposes the loop exactly once when the subscription ends, whether
//! by completion, error or unsubscribe. Nothing is acquired until someone
//! subscribes.

use std::sync::Arc;

use tracing::{debug, error};

use super::{BoxObservable, BoxObserver, Observable, Observer, StreamError, Subscription};
use crate::error::Result;
use crate::scheduler::DisposableScheduler;

/// Produces a fresh, caller-owned event loop
pub type EventLoopFactory = Arc<dyn Fn() -> Result<Arc<dyn DisposableScheduler>> + Send + Sync>;

type StreamFactory<T> = Arc<dyn Fn(Arc<dyn DisposableScheduler>) -> BoxObservable<T> + Send + Sync>;

/// Cold observable binding an event loop's lifetime to each subscription
pub struct UsingEventLoop<T> {
    acquire: EventLoopFactory,
    factory: StreamFactory<T>,
}

impl<T> Clone for UsingEventLoop<T> {
    fn clone(&self) -> Self {
        Self {
            acquire: self.acquire.clone(),
            factory: self.factory.clone(),
        }
    }
}

impl<T> UsingEventLoop<T> {
    /// `acquire` runs once per subscription; `factory` builds the stream on
    /// the acquired scheduler
    pub fn new<A, F>(acquire: A, factory: F) -> Self
    where
        A: Fn() -> Result<Arc<dyn DisposableScheduler>> + Send + Sync + 'static,
        F: Fn(Arc<dyn DisposableScheduler>) -> BoxObservable<T> + Send + Sync + 'static,
    {
        Self {
            acquire: Arc::new(acquire),
            factory: Arc::new(factory),
        }
    }
}

impl<T: Send + 'static> Observable<T> for UsingEventLoop<T> {
    fn subscribe(&self, mut observer: BoxObserver<T>) -> Subscription {
        debug!("UsingEventLoop::subscribe: called");
        let scheduler = match (self.acquire)() {
            Ok(scheduler) => scheduler,
            Err(e) => {
                error!(error = %e, "Failed to acquire event loop for subscription");
                observer.on_error(e.into());
                return Subscription::closed();
            }
        };

        let subscription = Subscription::new();

        // Registered first so it runs last, after the inner stream is torn down
        let release = scheduler.clone();
        subscription.add(move || {
            debug!("UsingEventLoop: subscription ended, disposing event loop");
            if let Err(e) = release.dispose() {
                error!(error = %e, "Failed to dispose event loop at end of subscription");
            }
        });

        let source = (self.factory)(scheduler);
        let inner = source.subscribe(Box::new(ReleasingObserver {
            downstream: observer,
            subscription: subscription.clone(),
        }));
        subscription.add(move || inner.unsubscribe());

        subscription
    }
}

/// Forwards notifications and ends the owning subscription on a terminal event
struct ReleasingObserver<T> {
    downstream: BoxObserver<T>,
    subscription: Subscription,
}

impl<T> Observer<T> for ReleasingObserver<T> {
    fn on_next(&mut self, item: T) {
        self.downstream.on_next(item);
    }

    fn on_error(&mut self, error: StreamError) {
        self.downstream.on_error(error);
        self.subscription.unsubscribe();
    }

    fn on_completed(&mut self) {
        self.downstream.on_completed();
        self.subscription.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disposing::DisposingScheduler;
    use crate::error::SchedulerError;
    use crate::scheduler::ImmediateScheduler;
    use crate::stream::{FnObserver, fail, from_iter};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counters {
        acquired: AtomicUsize,
        disposed: AtomicUsize,
    }

    fn counted_acquire(counters: Arc<Counters>) -> impl Fn() -> Result<Arc<dyn DisposableScheduler>> + Send + Sync {
        move || {
            counters.acquired.fetch_add(1, Ordering::SeqCst);
            let on_dispose = counters.clone();
            let scheduler: Arc<dyn DisposableScheduler> =
                Arc::new(DisposingScheduler::new("counted", ImmediateScheduler::new(), move |_| {
                    on_dispose.disposed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }));
            Ok(scheduler)
        }
    }

    fn counters() -> Arc<Counters> {
        Arc::new(Counters {
            acquired: AtomicUsize::new(0),
            disposed: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_nothing_acquired_before_subscribe() {
        let counts = counters();
        let _stream = UsingEventLoop::new(counted_acquire(counts.clone()), |_| from_iter(vec![1]));
        assert_eq!(counts.acquired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_completion_disposes_once() {
        let counts = counters();
        let stream = UsingEventLoop::new(counted_acquire(counts.clone()), |_| from_iter(vec![1, 2]));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = stream.subscribe(Box::new(FnObserver::new(move |n: i32| {
            sink.lock().expect("poisoned").push(n)
        })));

        assert!(subscription.is_closed());
        subscription.unsubscribe();
        assert_eq!(*seen.lock().expect("poisoned"), vec![1, 2]);
        assert_eq!(counts.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(counts.disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_disposes_once() {
        let counts = counters();
        let stream = UsingEventLoop::new(counted_acquire(counts.clone()), |_| fail::<i32>(StreamError::msg("bad")));

        let errors = Arc::new(AtomicUsize::new(0));
        let sink = errors.clone();
        stream.subscribe(Box::new(FnObserver::new(|_: i32| {}).with_error(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        })));

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(counts.disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_each_subscription_gets_its_own_scheduler() {
        let counts = counters();
        let stream = UsingEventLoop::new(counted_acquire(counts.clone()), |_| from_iter(vec![0]));

        stream.subscribe(Box::new(FnObserver::new(|_: i32| {})));
        stream.clone().subscribe(Box::new(FnObserver::new(|_: i32| {})));

        assert_eq!(counts.acquired.load(Ordering::SeqCst), 2);
        assert_eq!(counts.disposed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_acquire_failure_reaches_observer() {
        let stream = UsingEventLoop::<i32>::new(
            || Err(SchedulerError::InvalidArgument("no loops today".to_string())),
            |_| from_iter(Vec::new()),
        );

        let message = Arc::new(Mutex::new(String::new()));
        let sink = message.clone();
        let subscription = stream.subscribe(Box::new(
            FnObserver::new(|_: i32| {}).with_error(move |e| *sink.lock().expect("poisoned") = e.to_string()),
        ));

        assert!(subscription.is_closed());
        assert!(message.lock().expect("poisoned").contains("no loops today"));
    }
}
