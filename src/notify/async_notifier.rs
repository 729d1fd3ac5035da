//! Asynchronous fan-out of listener notifications.

use std::fmt::Display;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::core::error::PoolError;
use crate::core::managed::ManagedExecutor;

/// Supplies the listeners registered for a key.
///
/// The notifier queries listeners on a worker thread at delivery time, so a
/// registration added between dispatch and delivery is still notified.
pub trait ListenerSource<K, L: ?Sized>: Send + Sync {
    /// Listeners currently registered for `key`.
    fn listeners(&self, key: &K) -> Vec<Arc<L>>;
}

/// Delivers listener callbacks off the caller's thread.
///
/// `notify_async` submits one fetch job; that job fans out one delivery job
/// per listener on the same executor. Dispatch never blocks the caller, and
/// a rejected delivery is logged without affecting the others.
pub struct AsyncNotifier<S> {
    source: Arc<S>,
    executor: Arc<ManagedExecutor>,
}

impl<S> AsyncNotifier<S> {
    /// Notifier reading listeners from `source` and running deliveries on
    /// `executor`.
    pub fn new(source: Arc<S>, executor: Arc<ManagedExecutor>) -> Self {
        Self { source, executor }
    }

    /// Apply `action` to every listener of `key`, asynchronously.
    ///
    /// # Errors
    /// The errors of [`ManagedExecutor::execute`] when the fetch job cannot
    /// be submitted; per-listener rejections are only logged.
    pub fn notify_async<K, L, A>(&self, key: K, action: A) -> Result<(), PoolError>
    where
        S: ListenerSource<K, L> + 'static,
        K: Display + Send + 'static,
        L: ?Sized + Send + Sync + 'static,
        A: Fn(&L) + Send + Sync + 'static,
    {
        debug!(key = %key, "dispatching async notification");
        let source = Arc::clone(&self.source);
        let executor = Arc::clone(&self.executor);
        let action = Arc::new(action);
        self.executor.execute(move || {
            let listeners = source.listeners(&key);
            trace!(key = %key, listener_count = listeners.len(), "notifying listeners");
            for listener in listeners {
                let action = Arc::clone(&action);
                let delivery = move || action(listener.as_ref());
                if let Err(error) = executor.execute(delivery) {
                    warn!(key = %key, error = %error, "listener notification rejected");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolSpec;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    struct Probe {
        id: usize,
    }

    struct FixedSource {
        registered: Vec<Arc<Probe>>,
    }

    impl ListenerSource<String, Probe> for FixedSource {
        fn listeners(&self, _key: &String) -> Vec<Arc<Probe>> {
            self.registered.clone()
        }
    }

    #[test]
    fn every_listener_is_notified() {
        let executor = Arc::new(ManagedExecutor::new(
            PoolSpec::named("notify").with_min_pool_size(2),
        ));
        executor.initialize().unwrap();
        let source = Arc::new(FixedSource {
            registered: (0..3).map(|id| Arc::new(Probe { id })).collect(),
        });
        let notifier = AsyncNotifier::new(source, Arc::clone(&executor));

        let (tx, rx) = unbounded();
        notifier
            .notify_async("order.created".to_owned(), move |listener: &Probe| {
                let _ = tx.send(listener.id);
            })
            .unwrap();

        let mut seen: Vec<usize> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
        executor.dispose();
    }

    #[test]
    fn dispatch_on_a_disposed_executor_fails() {
        let executor = Arc::new(ManagedExecutor::new(PoolSpec::named("gone")));
        executor.initialize().unwrap();
        executor.dispose();
        let source = Arc::new(FixedSource { registered: vec![] });
        let notifier = AsyncNotifier::new(source, executor);

        let result = notifier.notify_async("ignored".to_owned(), |_listener: &Probe| {});
        assert!(matches!(result, Err(PoolError::Disposed(_))));
    }
}
