//! ObserveOn - re-deliver notifications as scheduler jobs

use std::sync::Arc;

use tracing::debug;

use super::observer::SharedObserver;
use super::{BoxObservable, BoxObserver, Observable, Observer, StreamError, Subscription};
use crate::scheduler::Scheduler;

/// Observable that moves delivery onto a scheduler
///
/// Every upstream notification becomes one job, so on a serial scheduler the
/// observer sees items in upstream order on the scheduler's thread. Jobs that
/// run after unsubscription deliver nothing.
pub struct ObserveOn<T> {
    source: BoxObservable<T>,
    scheduler: Arc<dyn Scheduler>,
}

impl<T> ObserveOn<T> {
    pub fn new(source: BoxObservable<T>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { source, scheduler }
    }
}

impl<T: Send + 'static> Observable<T> for ObserveOn<T> {
    fn subscribe(&self, observer: BoxObserver<T>) -> Subscription {
        debug!("ObserveOn::subscribe: called");
        let subscription = Subscription::new();
        let upstream = ObserveOnObserver {
            downstream: SharedObserver::new(observer),
            scheduler: self.scheduler.clone(),
            subscription: subscription.clone(),
        };

        let inner = self.source.subscribe(Box::new(upstream));
        subscription.add(move || inner.unsubscribe());
        subscription
    }
}

struct ObserveOnObserver<T> {
    downstream: SharedObserver<T>,
    scheduler: Arc<dyn Scheduler>,
    subscription: Subscription,
}

impl<T: Send + 'static> ObserveOnObserver<T> {
    fn deliver<F>(&self, notify: F)
    where
        F: FnOnce(&SharedObserver<T>) + Send + 'static,
    {
        if self.subscription.is_closed() {
            return;
        }
        let downstream = self.downstream.clone();
        let subscription = self.subscription.clone();

        let scheduled = self.scheduler.schedule(Box::new(move || {
            if !subscription.is_closed() {
                notify(&downstream);
            }
        }));

        if let Err(e) = scheduled {
            if self.subscription.is_closed() {
                debug!(error = %e, "ObserveOn: notification dropped after unsubscribe");
            } else {
                debug!(error = %e, "ObserveOn: scheduler rejected notification, failing downstream");
                self.downstream.error(e.into());
            }
        }
    }
}

impl<T: Send + 'static> Observer<T> for ObserveOnObserver<T> {
    fn on_next(&mut self, item: T) {
        self.deliver(move |downstream| downstream.next(item));
    }

    fn on_error(&mut self, error: StreamError) {
        self.deliver(move |downstream| downstream.error(error));
    }

    fn on_completed(&mut self) {
        self.deliver(|downstream| downstream.complete());
    }
}
