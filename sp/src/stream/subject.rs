//! Subject - hot multicast source

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::observer::SharedObserver;
use super::{BoxObserver, Observable, Observer, StreamError, Subscription};

enum Terminal {
    Completed,
    Failed(StreamError),
}

struct SubjectState<T> {
    observers: Vec<(u64, SharedObserver<T>)>,
    next_id: u64,
    terminal: Option<Terminal>,
}

/// Pushes every item to the observers subscribed at the time of the push
///
/// Late subscribers to a terminated subject receive the terminal event
/// immediately.
pub struct Subject<T> {
    state: Arc<Mutex<SubjectState<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Default for Subject<T> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(SubjectState {
                observers: Vec::new(),
                next_id: 0,
                terminal: None,
            })),
        }
    }
}

impl<T: Clone + Send + 'static> Subject<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SubjectState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `item` to current observers
    pub fn next(&self, item: T) {
        let observers: Vec<_> = {
            let state = self.lock();
            if state.terminal.is_some() {
                return;
            }
            state.observers.iter().map(|(_, o)| o.clone()).collect()
        };
        for observer in observers {
            observer.next(item.clone());
        }
    }

    /// Fail every observer and terminate the subject
    pub fn error(&self, error: StreamError) {
        let observers = {
            let mut state = self.lock();
            if state.terminal.is_some() {
                return;
            }
            state.terminal = Some(Terminal::Failed(error.clone()));
            std::mem::take(&mut state.observers)
        };
        debug!(count = observers.len(), "Subject::error: terminating observers");
        for (_, observer) in observers {
            observer.error(error.clone());
        }
    }

    /// Complete every observer and terminate the subject
    pub fn complete(&self) {
        let observers = {
            let mut state = self.lock();
            if state.terminal.is_some() {
                return;
            }
            state.terminal = Some(Terminal::Completed);
            std::mem::take(&mut state.observers)
        };
        debug!(count = observers.len(), "Subject::complete: completing observers");
        for (_, observer) in observers {
            observer.complete();
        }
    }

    /// Number of live subscriptions
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }
}

impl<T: Clone + Send + 'static> Observable<T> for Subject<T> {
    fn subscribe(&self, observer: BoxObserver<T>) -> Subscription {
        let observer = SharedObserver::new(observer);
        let mut state = self.lock();

        match &state.terminal {
            Some(Terminal::Completed) => {
                drop(state);
                observer.complete();
                return Subscription::closed();
            }
            Some(Terminal::Failed(error)) => {
                let error = error.clone();
                drop(state);
                observer.error(error);
                return Subscription::closed();
            }
            None => {}
        }

        let id = state.next_id;
        state.next_id += 1;
        state.observers.push((id, observer));
        drop(state);

        let subscription = Subscription::new();
        let subject = self.clone();
        subscription.add(move || {
            subject.lock().observers.retain(|(other, _)| *other != id);
        });
        subscription
    }
}

impl<T: Clone + Send + 'static> Observer<T> for Subject<T> {
    fn on_next(&mut self, item: T) {
        self.next(item);
    }

    fn on_error(&mut self, error: StreamError) {
        self.error(error);
    }

    fn on_completed(&mut self) {
        self.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{FnObserver, ObservableExt};

    #[test]
    fn test_multicast_and_unsubscribe() {
        let subject = Subject::new();
        let a = Arc::new(Mutex::new(Vec::new()));
        let b = Arc::new(Mutex::new(Vec::new()));

        let sink = a.clone();
        let sub_a = subject.subscribe_fn(move |n: i32| sink.lock().expect("poisoned").push(n));
        let sink = b.clone();
        let _sub_b = subject.subscribe_fn(move |n: i32| sink.lock().expect("poisoned").push(n));
        assert_eq!(subject.observer_count(), 2);

        subject.next(1);
        sub_a.unsubscribe();
        subject.next(2);

        assert_eq!(*a.lock().expect("poisoned"), vec![1]);
        assert_eq!(*b.lock().expect("poisoned"), vec![1, 2]);
        assert_eq!(subject.observer_count(), 1);
    }

    #[test]
    fn test_late_subscriber_gets_completion() {
        let subject = Subject::<i32>::new();
        subject.complete();

        let done = Arc::new(Mutex::new(false));
        let flag = done.clone();
        let subscription = subject.subscribe(Box::new(
            FnObserver::new(|_: i32| {}).with_completed(move || *flag.lock().expect("poisoned") = true),
        ));

        assert!(*done.lock().expect("poisoned"));
        assert!(subscription.is_closed());
    }

    #[test]
    fn test_complete_from_inside_on_next() {
        let subject = Subject::<i32>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner = subject.clone();
        let items = log.clone();
        let done = log.clone();
        let _subscription = subject.subscribe(Box::new(
            FnObserver::new(move |n: i32| {
                inner.complete();
                items.lock().expect("poisoned").push(format!("next {}", n));
            })
            .with_completed(move || done.lock().expect("poisoned").push("completed".to_string())),
        ));

        let (tx, rx) = std::sync::mpsc::channel();
        let emitter = subject.clone();
        std::thread::spawn(move || {
            emitter.next(1);
            emitter.next(2);
            let _ = tx.send(());
        });

        rx.recv_timeout(std::time::Duration::from_secs(5))
            .expect("emitting thread blocked");
        assert_eq!(*log.lock().expect("poisoned"), vec!["next 1", "completed"]);
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn test_next_after_error_ignored() {
        let subject = Subject::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(0));

        let sink = seen.clone();
        let error_sink = errors.clone();
        subject.subscribe(Box::new(
            FnObserver::new(move |n: i32| sink.lock().expect("poisoned").push(n))
                .with_error(move |_| *error_sink.lock().expect("poisoned") += 1),
        ));

        subject.error(StreamError::msg("upstream failed"));
        subject.next(5);

        assert!(seen.lock().expect("poisoned").is_empty());
        assert_eq!(*errors.lock().expect("poisoned"), 1);
    }
}
