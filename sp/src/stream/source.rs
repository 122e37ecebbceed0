//! Cold sources

use std::sync::Arc;

use super::{BoxObservable, BoxObserver, Observable, StreamError, Subscription};

struct IterSource<T> {
    items: Vec<T>,
}

impl<T: Clone + Send + Sync> Observable<T> for IterSource<T> {
    fn subscribe(&self, mut observer: BoxObserver<T>) -> Subscription {
        for item in &self.items {
            observer.on_next(item.clone());
        }
        observer.on_completed();
        Subscription::closed()
    }
}

/// Emit `items` synchronously on subscribe, then complete
pub fn from_iter<T, I>(items: I) -> BoxObservable<T>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = T>,
{
    Arc::new(IterSource {
        items: items.into_iter().collect(),
    })
}

struct FailSource {
    error: StreamError,
}

impl<T> Observable<T> for FailSource {
    fn subscribe(&self, mut observer: BoxObserver<T>) -> Subscription {
        observer.on_error(self.error.clone());
        Subscription::closed()
    }
}

/// Fail every subscriber immediately with `error`
pub fn fail<T: 'static>(error: StreamError) -> BoxObservable<T> {
    Arc::new(FailSource { error })
}
