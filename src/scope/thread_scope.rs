//! Per-thread scoped values with a periodic dead-thread sweep.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::config::ScopeSpec;
use crate::core::error::PoolError;
use crate::schedule::fixed_rate::{FixedRateHandle, ScheduledPool};

/// Dropped by the runtime when its thread exits; the scope keeps only a
/// weak probe to it.
struct LivenessToken;

thread_local! {
    static LIVENESS: Arc<LivenessToken> = Arc::new(LivenessToken);
}

struct ThreadEntry<K, V> {
    alive: Weak<LivenessToken>,
    values: Mutex<HashMap<K, Arc<V>>>,
}

/// A key-value cache partitioned by calling thread.
///
/// `scoped` computes a value once per thread and key; other threads never
/// see it. Entries of exited threads are reclaimed by [`ThreadScope::sweep`],
/// normally driven by a repeating registration armed with
/// [`ThreadScope::arm_sweeper`]. Liveness is probed through a thread-local
/// token, not through thread handles.
pub struct ThreadScope<K, V> {
    entries: RwLock<HashMap<ThreadId, Arc<ThreadEntry<K, V>>>>,
    sweep_period: Duration,
    sweeper: Mutex<Option<FixedRateHandle>>,
}

impl<K, V> ThreadScope<K, V> {
    /// Scope sweeping dead threads every `sweep_period`.
    #[must_use]
    pub fn new(sweep_period: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            sweep_period,
            sweeper: Mutex::new(None),
        }
    }

    /// Scope configured by `spec`.
    #[must_use]
    pub fn from_spec(spec: &ScopeSpec) -> Self {
        Self::new(spec.period())
    }

    /// Drop every entry whose thread has exited. Returns how many were
    /// removed.
    ///
    /// Runs under the same write lock as entry creation, so a sweep never
    /// discards a slot a starting thread has just inserted.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.alive.strong_count() > 0);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed = removed, "swept dead thread contexts");
        }
        removed
    }

    /// Number of thread contexts currently tracked, dead ones included
    /// until the next sweep.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no thread context is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Cancel the armed sweeper, if any. Idempotent.
    pub fn release(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.cancel();
            debug!("scope sweeper released");
        }
    }
}

impl<K, V> ThreadScope<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Send + Sync + 'static,
{
    /// The calling thread's value for `key`, computed by `factory` on the
    /// thread's first access and cached for its lifetime.
    pub fn scoped<F>(&self, key: K, factory: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        let entry = self.entry_for_current_thread();
        let mut values = entry.values.lock();
        Arc::clone(values.entry(key).or_insert_with(|| Arc::new(factory())))
    }

    /// Sweep this scope every sweep period on `pool`. Replaces a previously
    /// armed sweeper.
    ///
    /// The registration holds only a weak reference; dropping the scope
    /// cancels it.
    ///
    /// # Errors
    /// As [`ScheduledPool::schedule_at_fixed_rate`].
    pub fn arm_sweeper(self: &Arc<Self>, pool: &ScheduledPool) -> Result<(), PoolError> {
        let scope = Arc::downgrade(self);
        let (handle, _outcomes) = pool.schedule_at_fixed_rate(
            self.sweep_period,
            self.sweep_period,
            Arc::new(move || {
                if let Some(scope) = scope.upgrade() {
                    scope.sweep();
                }
                Ok(())
            }),
        )?;
        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.cancel();
        }
        Ok(())
    }

    fn entry_for_current_thread(&self) -> Arc<ThreadEntry<K, V>> {
        let id = thread::current().id();
        if let Some(entry) = self.entries.read().get(&id) {
            return Arc::clone(entry);
        }
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(id).or_insert_with(|| {
            Arc::new(ThreadEntry {
                alive: LIVENESS.with(Arc::downgrade),
                values: Mutex::new(HashMap::new()),
            })
        }))
    }
}

impl<K, V> Drop for ThreadScope<K, V> {
    fn drop(&mut self) {
        self.release();
    }
}
