//! SchedProv - Injectable scheduler provider
//!
//! A single place to obtain execution contexts, so code can take a
//! [`SchedulerProvider`] and tests can swap in a deterministic one.
//!
//! # Core Concepts
//!
//! - **Stock schedulers**: immediate, current-thread, new-thread, thread pool
//!   and task pool, shared per provider
//! - **Owned event loops**: callers get a [`DisposableScheduler`] whose
//!   dispose runs its teardown at most once, rolling back if teardown fails
//! - **Deferred shutdown**: disposing an event loop queues the stop behind
//!   work already submitted, so in-flight jobs finish
//! - **Lifetime-bound streams**: [`UsingEventLoop`] acquires a loop per
//!   subscription and disposes it when the subscription ends
//!
//! # Modules
//!
//! - [`scheduler`] - Scheduler traits and the concrete strategies
//! - [`disposing`] - One-shot disposal wrapper
//! - [`provider`] - Provider trait and default implementation
//! - [`stream`] - Observables, subscriptions and `using_event_loop`
//! - [`testing`] - Virtual-time scheduler and provider for tests
//! - [`config`] - Configuration types and loading
//! - [`thread`] - Named thread factories

pub mod config;
pub mod disposing;
pub mod error;
pub mod provider;
pub mod scheduler;
pub mod stream;
pub mod testing;
pub mod thread;

pub use config::ProviderConfig;
pub use disposing::{DisposingScheduler, DisposingSchedulerBuilder};
pub use error::{Result, SchedulerError};
pub use provider::{DefaultSchedulerProvider, SchedulerProvider, disposing_event_loop};
pub use scheduler::{
    CurrentThreadScheduler, DisposableScheduler, EventLoopScheduler, ImmediateScheduler, Job, NewThreadScheduler,
    ScheduledHandle, Scheduler, SchedulerExt, TaskPoolScheduler, ThreadPoolScheduler,
};
pub use stream::{
    BoxObservable, BoxObserver, FnObserver, Observable, ObservableExt, Observer, StreamError, Subject, Subscription,
    UsingEventLoop,
};
pub use testing::{TestScheduler, TestSchedulerProvider};
pub use thread::ThreadFactory;
