//! Builder turning a pool spec into a running pool.

use std::sync::Arc;

use tracing::debug;

use crate::config::{PoolSpec, TimeUnit};
use crate::core::error::PoolError;
use crate::core::queue::QueueStrategy;
use crate::core::thread_factory::ThreadFactory;
use crate::core::worker_pool::{FailureHandler, LoggingFailureHandler, PoolLimits, WorkerPool};
use crate::schedule::fixed_rate::ScheduledPool;

/// Forwarding builder over a [`PoolSpec`] plus construction-time
/// collaborators the spec cannot carry.
///
/// `build` is atomic: it either returns a pool ready to lazily spawn workers
/// or fails without side effects. No thread exists until the first job.
pub struct ExecutorBuilder {
    spec: PoolSpec,
    factory: Option<ThreadFactory>,
    handler: Arc<dyn FailureHandler>,
}

impl ExecutorBuilder {
    /// Start from an existing spec.
    #[must_use]
    pub fn from_spec(spec: PoolSpec) -> Self {
        Self {
            spec,
            factory: None,
            handler: Arc::new(LoggingFailureHandler),
        }
    }

    /// Start from the defaults for `name`.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::from_spec(PoolSpec::named(name))
    }

    /// Set the core pool size.
    #[must_use]
    pub fn min_pool_size(mut self, size: usize) -> Self {
        self.spec = self.spec.with_min_pool_size(size);
        self
    }

    /// Bound the pool to `size` threads.
    #[must_use]
    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.spec = self.spec.with_max_pool_size(size);
        self
    }

    /// Set the idle keep-alive window for threads above the core size.
    #[must_use]
    pub fn keep_alive(mut self, amount: u64, unit: TimeUnit) -> Self {
        self.spec = self.spec.with_keep_alive(amount, unit);
        self
    }

    /// Select the queue discipline.
    #[must_use]
    pub fn queue_mode(mut self, mode: QueueStrategy) -> Self {
        self.spec = self.spec.with_queue_mode(mode);
        self
    }

    /// Bound the queue to `capacity` pending jobs.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.spec = self.spec.with_queue_capacity(capacity);
        self
    }

    /// Bound the graceful drain during shutdown.
    #[must_use]
    pub fn shutdown_timeout(mut self, amount: u64, unit: TimeUnit) -> Self {
        self.spec = self.spec.with_shutdown_timeout(amount, unit);
        self
    }

    /// Use `factory` for worker threads instead of the `{name}-worker`
    /// default.
    #[must_use]
    pub fn thread_factory(mut self, factory: ThreadFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Deliver task failures to `handler` instead of the logging default.
    #[must_use]
    pub fn failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Validate the spec and construct the pool.
    ///
    /// # Errors
    /// `Configuration` for invariant violations and unsupported
    /// queue/capacity combinations; nothing is allocated on failure.
    pub fn build(self) -> Result<WorkerPool, PoolError> {
        self.spec
            .validate()
            .map_err(|e| PoolError::Configuration(format!("pool `{}`: {e}", self.spec.name)))?;
        let queue = self.spec.queue_mode.build(self.spec.queue_capacity)?;
        let limits = PoolLimits {
            core_size: self.spec.min_pool_size,
            max_size: self.spec.max_pool_size.unwrap_or(usize::MAX),
            keep_alive: self.spec.keep_alive(),
        };
        let factory = self
            .factory
            .unwrap_or_else(|| ThreadFactory::new(format!("{}-worker", self.spec.name)));
        debug!(
            pool = %self.spec.name,
            core_pool_size = limits.core_size,
            queue_mode = self.spec.queue_mode.as_str(),
            "building pool"
        );
        Ok(WorkerPool::new(
            self.spec.name.clone(),
            limits,
            queue,
            factory,
            self.handler,
        ))
    }

    /// Construct the pool wrapped with fixed-rate scheduling capability.
    ///
    /// # Errors
    /// As [`ExecutorBuilder::build`].
    pub fn build_scheduled(self) -> Result<ScheduledPool, PoolError> {
        let name = self.spec.name.clone();
        let pool = self.build()?;
        Ok(ScheduledPool::new(name, pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn build_applies_the_spec() {
        let pool = ExecutorBuilder::named("built")
            .min_pool_size(1)
            .max_pool_size(3)
            .keep_alive(100, TimeUnit::Milliseconds)
            .queue_mode(QueueStrategy::Static)
            .queue_capacity(16)
            .build()
            .unwrap();

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.name, "built");
        assert_eq!(snapshot.core_pool_size, 1);
        assert_eq!(snapshot.maximum_pool_size, 3);
        // construction is lazy, no threads yet
        assert_eq!(snapshot.pool_size, 0);
        assert!(pool.shutdown(Duration::from_secs(1)));
    }

    #[test]
    fn unbounded_maximum_uses_the_full_range() {
        let pool = ExecutorBuilder::named("wide").min_pool_size(1).build().unwrap();
        assert_eq!(pool.snapshot().maximum_pool_size, usize::MAX);
        assert!(pool.shutdown(Duration::from_secs(1)));
    }

    #[test]
    fn invalid_spec_fails_without_side_effects() {
        let result = ExecutorBuilder::named("broken")
            .min_pool_size(4)
            .max_pool_size(1)
            .build();
        match result {
            Err(PoolError::Configuration(message)) => {
                assert!(message.contains("pool `broken`"));
                assert!(message.contains("below min_pool_size"));
            }
            Ok(_) => panic!("expected configuration error"),
            Err(other) => panic!("expected configuration error, got {other}"),
        }
    }

    #[test]
    fn scheduled_build_exposes_the_pool() {
        let scheduled = ExecutorBuilder::named("ticker")
            .min_pool_size(1)
            .build_scheduled()
            .unwrap();
        assert_eq!(scheduled.name(), "ticker");
        assert!(scheduled.shutdown(Duration::from_secs(1)));
    }
}
