//! Named OS thread construction for pools and timers.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};

/// Factory producing named OS threads.
///
/// Thread names follow `{prefix}-{n}` with a monotonically increasing
/// counter, so every thread belonging to one pool is identifiable in traces
/// and debugger output. Clones share the counter.
#[derive(Debug, Clone)]
pub struct ThreadFactory {
    prefix: String,
    stack_size: Option<usize>,
    counter: Arc<AtomicUsize>,
}

impl ThreadFactory {
    /// Factory with the given name prefix and default stack size.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            stack_size: None,
            counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Use an explicit stack size for spawned threads.
    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn next_name(&self) -> String {
        format!("{}-{}", self.prefix, self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Spawn a named thread running `f`.
    ///
    /// # Errors
    /// Returns the OS error when thread creation fails.
    pub fn spawn<F>(&self, f: F) -> io::Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut builder = Builder::new().name(self.next_name());
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        builder.spawn(f)
    }
}
