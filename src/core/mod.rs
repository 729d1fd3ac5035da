//! Core pool, queue, registry, and lifecycle abstractions.

pub mod error;
pub mod managed;
pub mod queue;
pub mod registry;
pub mod thread_factory;
pub mod worker_pool;

pub use error::{AppResult, JoinError, PoolError};
pub use managed::ManagedExecutor;
pub use queue::{JobQueue, Priority, QueueStrategy};
pub use registry::ExecutorRegistry;
pub use thread_factory::ThreadFactory;
pub use worker_pool::{
    FailureHandler, LoggingFailureHandler, PoolSnapshot, TaskHandle, WorkerPool,
};
