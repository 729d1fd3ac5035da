//! Error types for pool provisioning, lifecycle, and scheduling.

use thiserror::Error;

/// Errors produced by pools, registries, builders, and schedulers.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Malformed or contradictory configuration; fatal at startup.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A pool was declared under a name that is already taken.
    #[error("pool `{0}` is already declared")]
    DuplicateName(String),

    /// Lookup of a name that was never declared.
    #[error("pool `{0}` is not configured")]
    NotConfigured(String),

    /// The executor was used before `initialize`.
    #[error("executor `{0}` is not initialized")]
    NotInitialized(String),

    /// `initialize` was called on an executor that is already running.
    #[error("executor `{0}` is already initialized")]
    AlreadyInitialized(String),

    /// The executor was used after `dispose`.
    #[error("executor `{0}` is disposed")]
    Disposed(String),

    /// Bounded queue full and the pool at its maximum size.
    #[error("pool `{0}` is saturated")]
    Saturated(String),

    /// A scheduler was driven through a transition its phase forbids.
    #[error("scheduler `{scheduler}` cannot {action} while {phase}")]
    IllegalTransition {
        /// Scheduler name.
        scheduler: String,
        /// The rejected operation.
        action: &'static str,
        /// Phase the scheduler was in.
        phase: &'static str,
    },

    /// A worker or timer thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failure retrieving a submitted job's result.
#[derive(Debug, Error)]
pub enum JoinError {
    /// The job panicked while running.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The pool dropped the job before it completed.
    #[error("task abandoned before completion")]
    Abandoned,

    /// The bounded wait elapsed before the job finished.
    #[error("timed out waiting for task result")]
    Timeout,
}

/// Application-facing result for task bodies and higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

/// Render a panic payload as a message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload.downcast_ref::<&str>().map_or_else(
        || {
            payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "opaque panic payload".to_owned())
        },
        |s| (*s).to_owned(),
    )
}
