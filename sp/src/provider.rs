//! SchedulerProvider - one injectable source for every scheduling strategy
//!
//! Code that needs a scheduler takes a provider instead of reaching for a
//! global. Production wiring builds one [`DefaultSchedulerProvider`] at
//! startup and passes it down; tests pass a
//! [`TestSchedulerProvider`](crate::testing::TestSchedulerProvider) instead.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::disposing::DisposingScheduler;
use crate::error::{Result, SchedulerError};
use crate::scheduler::{
    CurrentThreadScheduler, DisposableScheduler, EventLoopScheduler, ImmediateScheduler, NewThreadScheduler,
    Scheduler, TaskPoolScheduler, ThreadPoolScheduler,
};
use crate::stream::{BoxObservable, UsingEventLoop};
use crate::thread::ThreadFactory;

/// Named scheduling strategies plus owned, lifetime-bound event loops
pub trait SchedulerProvider: Send + Sync {
    /// Runs jobs inline on the caller
    fn immediate(&self) -> Arc<dyn Scheduler>;

    /// Trampoline on the calling thread
    fn current_thread(&self) -> Arc<dyn Scheduler>;

    /// One new thread per job
    fn new_thread(&self) -> Arc<dyn Scheduler>;

    /// Shared worker pool
    fn thread_pool(&self) -> Arc<dyn Scheduler>;

    /// Shared async task pool
    fn task_pool(&self) -> Arc<dyn Scheduler>;

    /// Platform default strategy
    fn default_scheduler(&self) -> Arc<dyn Scheduler>;

    /// New-thread-per-job strategy whose threads carry `name`
    fn new_named_thread(&self, name: &str) -> Result<Arc<dyn Scheduler>>;

    /// New-thread-per-job strategy using a caller-supplied factory
    fn new_named_thread_with(&self, factory: ThreadFactory) -> Result<Arc<dyn Scheduler>>;

    /// A dedicated event loop the caller must dispose
    fn new_event_loop(&self) -> Result<Arc<dyn DisposableScheduler>>;

    /// A dedicated event loop on a thread named `name`
    fn new_event_loop_named(&self, name: &str) -> Result<Arc<dyn DisposableScheduler>>;

    /// A dedicated event loop on a thread from `factory`
    fn new_event_loop_with(&self, factory: ThreadFactory) -> Result<Arc<dyn DisposableScheduler>>;

    /// Stream whose every subscription runs on its own event loop
    ///
    /// The loop is created on subscribe, handed to `factory`, and disposed
    /// exactly once when the subscription completes, fails or is unsubscribed.
    fn using_event_loop<T, F>(&self, factory: F) -> UsingEventLoop<T>
    where
        Self: Clone + Sized + 'static,
        T: Send + 'static,
        F: Fn(Arc<dyn DisposableScheduler>) -> BoxObservable<T> + Send + Sync + 'static,
    {
        let provider = self.clone();
        UsingEventLoop::new(move || provider.new_event_loop(), factory)
    }

    /// [`using_event_loop`](Self::using_event_loop) with named loop threads
    fn using_event_loop_named<T, F>(&self, name: &str, factory: F) -> Result<UsingEventLoop<T>>
    where
        Self: Clone + Sized + 'static,
        T: Send + 'static,
        F: Fn(Arc<dyn DisposableScheduler>) -> BoxObservable<T> + Send + Sync + 'static,
    {
        let name = validate_name(name)?;
        let provider = self.clone();
        Ok(UsingEventLoop::new(move || provider.new_event_loop_named(&name), factory))
    }

    /// [`using_event_loop`](Self::using_event_loop) with loop threads from `thread_factory`
    fn using_event_loop_with<T, F>(&self, thread_factory: ThreadFactory, factory: F) -> UsingEventLoop<T>
    where
        Self: Clone + Sized + 'static,
        T: Send + 'static,
        F: Fn(Arc<dyn DisposableScheduler>) -> BoxObservable<T> + Send + Sync + 'static,
    {
        let provider = self.clone();
        UsingEventLoop::new(move || provider.new_event_loop_with(thread_factory.clone()), factory)
    }
}

pub(crate) fn validate_name(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(SchedulerError::InvalidArgument("thread name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

/// Wrap an event loop so disposing it enqueues the loop's own shutdown
///
/// Jobs already due run first; the loop thread then stops itself.
pub fn disposing_event_loop(event_loop: EventLoopScheduler) -> DisposingScheduler<EventLoopScheduler> {
    let name = event_loop.name().to_string();
    DisposingScheduler::new(name, event_loop, |event_loop: &EventLoopScheduler| {
        event_loop.shutdown_after_pending().map(|_| ())
    })
}

struct ProviderInner {
    config: ProviderConfig,
    immediate: Arc<dyn Scheduler>,
    current_thread: Arc<dyn Scheduler>,
    new_thread: Arc<dyn Scheduler>,
    thread_pool: Arc<dyn Scheduler>,
    task_pool: Arc<dyn Scheduler>,
}

/// Provider backed by real threads
///
/// Cloning shares the stock schedulers. They live as long as the last clone.
#[derive(Clone)]
pub struct DefaultSchedulerProvider {
    inner: Arc<ProviderInner>,
}

impl DefaultSchedulerProvider {
    /// Build every stock scheduler from `config`
    pub fn new(config: ProviderConfig) -> Result<Self> {
        debug!(?config, "DefaultSchedulerProvider::new: called");
        config
            .validate()
            .map_err(|e| SchedulerError::InvalidArgument(e.to_string()))?;

        let prefix = &config.thread_name_prefix;
        let thread_pool: Arc<dyn Scheduler> = Arc::new(ThreadPoolScheduler::new(prefix, config.worker_pool_size)?);
        let task_pool: Arc<dyn Scheduler> = Arc::new(TaskPoolScheduler::new(
            &format!("{}-task", prefix),
            config.task_pool_threads,
        )?);
        let new_thread: Arc<dyn Scheduler> = Arc::new(NewThreadScheduler::new(ThreadFactory::with_prefix(format!(
            "{}-thread",
            prefix
        ))));

        info!(
            worker_pool_size = config.worker_pool_size,
            task_pool_threads = config.task_pool_threads,
            "Scheduler provider ready"
        );

        Ok(Self {
            inner: Arc::new(ProviderInner {
                immediate: Arc::new(ImmediateScheduler::new()),
                current_thread: Arc::new(CurrentThreadScheduler::new()),
                new_thread,
                thread_pool,
                task_pool,
                config,
            }),
        })
    }

    /// Provider with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(ProviderConfig::default())
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.inner.config
    }
}

impl SchedulerProvider for DefaultSchedulerProvider {
    fn immediate(&self) -> Arc<dyn Scheduler> {
        self.inner.immediate.clone()
    }

    fn current_thread(&self) -> Arc<dyn Scheduler> {
        self.inner.current_thread.clone()
    }

    fn new_thread(&self) -> Arc<dyn Scheduler> {
        self.inner.new_thread.clone()
    }

    fn thread_pool(&self) -> Arc<dyn Scheduler> {
        self.inner.thread_pool.clone()
    }

    fn task_pool(&self) -> Arc<dyn Scheduler> {
        self.inner.task_pool.clone()
    }

    fn default_scheduler(&self) -> Arc<dyn Scheduler> {
        self.inner.thread_pool.clone()
    }

    fn new_named_thread(&self, name: &str) -> Result<Arc<dyn Scheduler>> {
        debug!(%name, "DefaultSchedulerProvider::new_named_thread: called");
        Ok(Arc::new(NewThreadScheduler::named(name)?))
    }

    fn new_named_thread_with(&self, factory: ThreadFactory) -> Result<Arc<dyn Scheduler>> {
        debug!(factory = %factory.label(), "DefaultSchedulerProvider::new_named_thread_with: called");
        Ok(Arc::new(NewThreadScheduler::new(factory)))
    }

    fn new_event_loop(&self) -> Result<Arc<dyn DisposableScheduler>> {
        let name = format!("{}-{}", self.inner.config.event_loop_prefix, Uuid::now_v7());
        debug!(%name, "DefaultSchedulerProvider::new_event_loop: called");
        self.new_event_loop_named(&name)
    }

    fn new_event_loop_named(&self, name: &str) -> Result<Arc<dyn DisposableScheduler>> {
        debug!(%name, "DefaultSchedulerProvider::new_event_loop_named: called");
        let name = validate_name(name)?;
        let event_loop = EventLoopScheduler::named(name)?;
        Ok(Arc::new(disposing_event_loop(event_loop)))
    }

    fn new_event_loop_with(&self, factory: ThreadFactory) -> Result<Arc<dyn DisposableScheduler>> {
        debug!(factory = %factory.label(), "DefaultSchedulerProvider::new_event_loop_with: called");
        let event_loop = EventLoopScheduler::with_factory(factory.label().to_string(), &factory)?;
        Ok(Arc::new(disposing_event_loop(event_loop)))
    }
}

impl fmt::Debug for DefaultSchedulerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultSchedulerProvider")
            .field("config", &self.inner.config)
            .finish()
    }
}
