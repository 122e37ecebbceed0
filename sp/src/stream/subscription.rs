//! Subscription handle with idempotent unsubscribe

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

type TeardownFn = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct State {
    closed: bool,
    teardowns: Vec<TeardownFn>,
}

/// Returned by [`Observable::subscribe`](super::Observable::subscribe)
///
/// `unsubscribe()` runs the registered teardowns exactly once, last added
/// first. Teardowns added after unsubscription run immediately. Clones share
/// the same state; dropping a handle does not unsubscribe.
#[derive(Clone, Default)]
pub struct Subscription {
    state: Arc<Mutex<State>>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscription that is already over
    pub fn closed() -> Self {
        let subscription = Self::new();
        subscription.lock().closed = true;
        subscription
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register work to run on unsubscribe
    pub fn add<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.lock();
        if state.closed {
            drop(state);
            teardown();
            return;
        }
        state.teardowns.push(Box::new(teardown));
    }

    /// End the subscription; only the first call does anything
    pub fn unsubscribe(&self) {
        let teardowns = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.teardowns)
        };
        debug!(count = teardowns.len(), "Subscription::unsubscribe: running teardowns");
        for teardown in teardowns.into_iter().rev() {
            teardown();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("closed", &self.is_closed()).finish()
    }
}
