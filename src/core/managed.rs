//! Lifecycle wrapper owning one pool from `initialize` through `dispose`.

use std::mem;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::builders::ExecutorBuilder;
use crate::config::PoolSpec;
use crate::core::error::PoolError;
use crate::core::queue::Priority;
use crate::core::thread_factory::ThreadFactory;
use crate::core::worker_pool::{
    FailureHandler, LoggingFailureHandler, PoolSnapshot, TaskHandle, WorkerPool,
};

enum Lifecycle {
    Uninitialized,
    Running(Arc<WorkerPool>),
    Disposed,
}

/// An executor bound to one spec, driven through a strict lifecycle.
///
/// The wrapped pool exists only between a successful [`initialize`] and the
/// first [`dispose`]; submissions outside that window fail fast. `dispose`
/// runs the shutdown protocol exactly once and never raises, so teardown
/// code can call it unconditionally.
///
/// [`initialize`]: ManagedExecutor::initialize
/// [`dispose`]: ManagedExecutor::dispose
pub struct ManagedExecutor {
    spec: PoolSpec,
    factory: ThreadFactory,
    handler: Arc<dyn FailureHandler>,
    state: RwLock<Lifecycle>,
}

impl ManagedExecutor {
    /// Executor in the uninitialized state; no threads exist yet.
    #[must_use]
    pub fn new(spec: PoolSpec) -> Self {
        let factory = ThreadFactory::new(format!("{}-worker", spec.name));
        Self {
            spec,
            factory,
            handler: Arc::new(LoggingFailureHandler),
            state: RwLock::new(Lifecycle::Uninitialized),
        }
    }

    /// Use `factory` for worker threads instead of the named default.
    #[must_use]
    pub fn with_thread_factory(mut self, factory: ThreadFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Deliver task failures to `handler` instead of the logging default.
    #[must_use]
    pub fn with_failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// The spec this executor was declared with.
    #[must_use]
    pub const fn spec(&self) -> &PoolSpec {
        &self.spec
    }

    /// True while the executor accepts work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(&*self.state.read(), Lifecycle::Running(_))
    }

    /// Build the pool and start accepting work.
    ///
    /// # Errors
    /// `AlreadyInitialized` when called twice, `Disposed` after teardown,
    /// `Configuration` when the spec fails validation; on error the executor
    /// keeps its previous state.
    pub fn initialize(&self) -> Result<(), PoolError> {
        let mut state = self.state.write();
        match &*state {
            Lifecycle::Uninitialized => {
                let pool = ExecutorBuilder::from_spec(self.spec.clone())
                    .thread_factory(self.factory.clone())
                    .failure_handler(Arc::clone(&self.handler))
                    .build()?;
                info!(pool = %self.spec.name, "executor initialized");
                *state = Lifecycle::Running(Arc::new(pool));
                Ok(())
            }
            Lifecycle::Running(_) => Err(PoolError::AlreadyInitialized(self.spec.name.clone())),
            Lifecycle::Disposed => Err(PoolError::Disposed(self.spec.name.clone())),
        }
    }

    fn pool(&self) -> Result<Arc<WorkerPool>, PoolError> {
        match &*self.state.read() {
            Lifecycle::Running(pool) => Ok(Arc::clone(pool)),
            Lifecycle::Uninitialized => Err(PoolError::NotInitialized(self.spec.name.clone())),
            Lifecycle::Disposed => Err(PoolError::Disposed(self.spec.name.clone())),
        }
    }

    /// Run `f` on the pool with normal priority.
    ///
    /// # Errors
    /// Lifecycle errors plus everything [`WorkerPool::execute`] returns.
    pub fn execute<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool()?.execute(f)
    }

    /// Run `f` with an explicit priority class.
    ///
    /// # Errors
    /// As [`ManagedExecutor::execute`].
    pub fn execute_prioritized<F>(&self, f: F, priority: Priority) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool()?.execute_prioritized(f, priority)
    }

    /// Run `f` and expose its result through the returned handle.
    ///
    /// # Errors
    /// As [`ManagedExecutor::execute`].
    pub fn submit<F, T>(&self, f: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.pool()?.submit(f)
    }

    /// Read-only statistics snapshot of the running pool.
    ///
    /// # Errors
    /// Lifecycle errors outside the running window.
    pub fn snapshot(&self) -> Result<PoolSnapshot, PoolError> {
        Ok(self.pool()?.snapshot())
    }

    /// Tear the pool down: stop admitting work, wait up to the configured
    /// shutdown timeout for queued jobs to drain, then abandon stragglers.
    ///
    /// Idempotent and infallible; calling it on an executor that never
    /// initialized is a no-op.
    pub fn dispose(&self) {
        let mut state = self.state.write();
        match mem::replace(&mut *state, Lifecycle::Disposed) {
            Lifecycle::Running(pool) => {
                let drained = pool.shutdown(self.spec.drain_timeout());
                debug!(pool = %self.spec.name, drained = drained, "executor disposed");
            }
            Lifecycle::Uninitialized => {
                debug!(pool = %self.spec.name, "dispose before initialize, nothing to shut down");
            }
            Lifecycle::Disposed => {
                debug!(pool = %self.spec.name, "executor already disposed");
            }
        }
    }
}
