//! Push-based stream boundary
//!
//! Just enough of an observable model to produce and consume lifetime-bound
//! streams: observers, subscriptions, a multicast [`Subject`], delivery onto a
//! scheduler with [`ObservableExt::observe_on`], and an adapter to
//! `futures::Stream`.

mod adapter;
mod observe_on;
mod observer;
mod source;
mod subject;
mod subscription;
mod using;

use std::fmt;
use std::sync::Arc;

use crate::error::SchedulerError;
use crate::scheduler::Scheduler;

pub use adapter::ObservableStream;
pub use observe_on::ObserveOn;
pub use observer::FnObserver;
pub use source::{fail, from_iter};
pub use subject::Subject;
pub use subscription::Subscription;
pub use using::{EventLoopFactory, UsingEventLoop};

/// Receives notifications from an [`Observable`]
///
/// At most one of `on_error` / `on_completed` is delivered, and nothing after it.
pub trait Observer<T>: Send {
    fn on_next(&mut self, item: T);
    fn on_error(&mut self, error: StreamError);
    fn on_completed(&mut self);
}

pub type BoxObserver<T> = Box<dyn Observer<T>>;

/// A source of notifications; each `subscribe` starts an independent delivery
pub trait Observable<T>: Send + Sync {
    fn subscribe(&self, observer: BoxObserver<T>) -> Subscription;
}

pub type BoxObservable<T> = Arc<dyn Observable<T>>;

impl<T, O: Observable<T> + ?Sized> Observable<T> for Arc<O> {
    fn subscribe(&self, observer: BoxObserver<T>) -> Subscription {
        (**self).subscribe(observer)
    }
}

/// Operators and subscribe helpers for every [`Observable`]
pub trait ObservableExt<T>: Observable<T> {
    /// Subscribe with only an item callback
    fn subscribe_fn<N>(&self, next: N) -> Subscription
    where
        N: FnMut(T) + Send + 'static,
        T: 'static,
    {
        self.subscribe(Box::new(FnObserver::new(next)))
    }

    fn boxed(self) -> BoxObservable<T>
    where
        Self: Sized + 'static,
    {
        Arc::new(self)
    }

    /// Deliver every notification as a job on `scheduler`
    fn observe_on<S>(self, scheduler: S) -> ObserveOn<T>
    where
        Self: Sized + 'static,
        S: Scheduler + 'static,
    {
        ObserveOn::new(Arc::new(self), Arc::new(scheduler))
    }

    /// Subscribe and expose the notifications as a `futures::Stream`
    fn into_stream(&self) -> ObservableStream<T>
    where
        T: Send + 'static,
    {
        ObservableStream::subscribe(self)
    }
}

impl<T, O: Observable<T> + ?Sized> ObservableExt<T> for O {}

/// Error delivered through [`Observer::on_error`]
#[derive(Clone)]
pub struct StreamError(Arc<eyre::Report>);

impl StreamError {
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(eyre::Report::msg(message)))
    }

    pub fn report(&self) -> &eyre::Report {
        &self.0
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for StreamError {}

impl From<eyre::Report> for StreamError {
    fn from(report: eyre::Report) -> Self {
        Self(Arc::new(report))
    }
}

impl From<SchedulerError> for StreamError {
    fn from(error: SchedulerError) -> Self {
        Self(Arc::new(eyre::Report::new(error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_from_scheduler_error() {
        let error: StreamError = SchedulerError::Shutdown {
            name: "gone".to_string(),
        }
        .into();
        assert_eq!(error.to_string(), "Scheduler gone is shut down");
        assert!(error.report().downcast_ref::<SchedulerError>().is_some());
    }

    #[test]
    fn test_stream_error_clones_share_report() {
        let error = StreamError::msg("shared");
        let clone = error.clone();
        assert_eq!(clone.to_string(), "shared");
    }
}
