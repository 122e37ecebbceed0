//! Observer helpers

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{BoxObserver, Observer, StreamError};

type NextFn<T> = Box<dyn FnMut(T) + Send>;
type ErrorFn = Box<dyn FnMut(StreamError) + Send>;
type CompletedFn = Box<dyn FnMut() + Send>;

/// Observer assembled from closures
pub struct FnObserver<T> {
    next: NextFn<T>,
    error: Option<ErrorFn>,
    completed: Option<CompletedFn>,
}

impl<T> FnObserver<T> {
    pub fn new<N>(next: N) -> Self
    where
        N: FnMut(T) + Send + 'static,
    {
        Self {
            next: Box::new(next),
            error: None,
            completed: None,
        }
    }

    pub fn with_error<E>(mut self, error: E) -> Self
    where
        E: FnMut(StreamError) + Send + 'static,
    {
        self.error = Some(Box::new(error));
        self
    }

    pub fn with_completed<C>(mut self, completed: C) -> Self
    where
        C: FnMut() + Send + 'static,
    {
        self.completed = Some(Box::new(completed));
        self
    }
}

impl<T> Observer<T> for FnObserver<T> {
    fn on_next(&mut self, item: T) {
        (self.next)(item);
    }

    fn on_error(&mut self, error: StreamError) {
        match self.error.as_mut() {
            Some(handler) => handler(error),
            None => tracing::warn!(%error, "Unhandled stream error"),
        }
    }

    fn on_completed(&mut self) {
        if let Some(handler) = self.completed.as_mut() {
            handler();
        }
    }
}

enum Event<T> {
    Next(T),
    Error(StreamError),
    Completed,
}

struct Cell<T> {
    observer: Option<BoxObserver<T>>,
    queue: VecDeque<Event<T>>,
    draining: bool,
    terminated: bool,
}

/// Thread-safe observer cell that serializes delivery
///
/// The observer is never called with the cell locked. Events raised while a
/// delivery is in progress, from the observer itself or from another thread,
/// are queued and delivered in order once it returns. Nothing is delivered
/// after the first terminal event.
pub(crate) struct SharedObserver<T> {
    inner: Arc<Mutex<Cell<T>>>,
}

impl<T> Clone for SharedObserver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Ends a drain that unwinds out of the observer
struct DrainReset<'a, T> {
    cell: &'a SharedObserver<T>,
    armed: bool,
}

impl<T> Drop for DrainReset<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            let mut cell = self.cell.lock();
            cell.draining = false;
            cell.terminated = true;
            cell.queue.clear();
        }
    }
}

impl<T> SharedObserver<T> {
    pub fn new(observer: BoxObserver<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Cell {
                observer: Some(observer),
                queue: VecDeque::new(),
                draining: false,
                terminated: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cell<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn next(&self, item: T) {
        self.push(Event::Next(item));
    }

    pub fn error(&self, error: StreamError) {
        self.push(Event::Error(error));
    }

    pub fn complete(&self) {
        self.push(Event::Completed);
    }

    fn push(&self, event: Event<T>) {
        {
            let mut cell = self.lock();
            if cell.terminated {
                return;
            }
            if !matches!(event, Event::Next(_)) {
                cell.terminated = true;
            }
            cell.queue.push_back(event);
            if cell.draining {
                return;
            }
            cell.draining = true;
        }
        self.drain();
    }

    fn drain(&self) {
        let mut reset = DrainReset { cell: self, armed: true };
        loop {
            let (event, observer) = {
                let mut cell = self.lock();
                match cell.queue.pop_front() {
                    Some(event) => {
                        let observer = cell.observer.take();
                        (event, observer)
                    }
                    None => {
                        cell.draining = false;
                        break;
                    }
                }
            };
            let Some(mut observer) = observer else {
                continue;
            };

            match event {
                Event::Next(item) => {
                    observer.on_next(item);
                    self.lock().observer = Some(observer);
                }
                Event::Error(error) => observer.on_error(error),
                Event::Completed => observer.on_completed(),
            }
        }
        reset.armed = false;
    }
}
