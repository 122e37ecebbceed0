//! Thread construction for dedicated-thread schedulers

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use tracing::debug;

/// Entry point handed to a [`ThreadFactory`]
pub type ThreadStart = Box<dyn FnOnce() + Send + 'static>;

type SpawnFn = dyn Fn(ThreadStart) -> io::Result<JoinHandle<()>> + Send + Sync;

/// Creates the OS threads backing new-thread and event loop schedulers
///
/// Cloning is cheap; clones share the underlying spawn function and any
/// naming counter it carries.
#[derive(Clone)]
pub struct ThreadFactory {
    label: String,
    spawn: Arc<SpawnFn>,
}

impl ThreadFactory {
    /// Build a factory from an arbitrary spawn function
    pub fn new<F>(label: impl Into<String>, spawn: F) -> Self
    where
        F: Fn(ThreadStart) -> io::Result<JoinHandle<()>> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            spawn: Arc::new(spawn),
        }
    }

    /// Every thread gets exactly `name`
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let thread_name = name.clone();
        Self::new(name, move |start| {
            std::thread::Builder::new().name(thread_name.clone()).spawn(start)
        })
    }

    /// Threads are named `<prefix>-<n>` with `n` counting from 1
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let counter = Arc::new(AtomicU64::new(0));
        let thread_prefix = prefix.clone();
        Self::new(prefix, move |start| {
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            std::thread::Builder::new()
                .name(format!("{}-{}", thread_prefix, n))
                .spawn(start)
        })
    }

    /// Label used in logs and errors for threads from this factory
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Start a thread running `start`
    pub fn spawn(&self, start: ThreadStart) -> io::Result<JoinHandle<()>> {
        debug!(label = %self.label, "ThreadFactory::spawn: called");
        (self.spawn)(start)
    }
}

impl fmt::Debug for ThreadFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadFactory").field("label", &self.label).finish()
    }
}
