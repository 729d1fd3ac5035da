//! Name-keyed executor registry with race-free single construction.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::{PoolSpec, RegistryConfig};
use crate::core::error::PoolError;
use crate::core::managed::ManagedExecutor;
use crate::core::worker_pool::{FailureHandler, PoolSnapshot};

/// One declared pool: its spec plus the build-once slot.
///
/// The slot mutex serializes construction per name, so concurrent first
/// accesses build exactly one executor and later callers reuse it. A failed
/// build leaves the slot empty and the next access retries.
struct RegistryEntry {
    spec: PoolSpec,
    slot: Mutex<Option<Arc<ManagedExecutor>>>,
}

/// Registry mapping pool names to lazily built executors.
#[derive(Default)]
pub struct ExecutorRegistry {
    entries: RwLock<HashMap<String, Arc<RegistryEntry>>>,
    handler: Option<Arc<dyn FailureHandler>>,
}

impl ExecutorRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver task failures of every built executor to `handler`.
    #[must_use]
    pub fn with_failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Registry pre-populated from configuration.
    ///
    /// # Errors
    /// Returns the first invalid spec; the partially declared registry is
    /// dropped in that case.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, PoolError> {
        let registry = Self::new();
        for spec in config.pools.values() {
            registry.declare(spec.clone())?;
        }
        info!(pool_count = config.pools.len(), "registry configured");
        Ok(registry)
    }

    /// Register a not-yet-built pool configuration.
    ///
    /// # Errors
    /// `Configuration` when the spec is invalid, `DuplicateName` when the
    /// name is already declared; the existing declaration stays intact.
    pub fn declare(&self, spec: PoolSpec) -> Result<(), PoolError> {
        spec.validate()
            .map_err(|e| PoolError::Configuration(format!("pool `{}`: {e}", spec.name)))?;
        let mut entries = self.entries.write();
        match entries.entry(spec.name.clone()) {
            Entry::Occupied(_) => Err(PoolError::DuplicateName(spec.name)),
            Entry::Vacant(vacant) => {
                debug!(pool = %spec.name, "pool declared");
                vacant.insert(Arc::new(RegistryEntry {
                    spec,
                    slot: Mutex::new(None),
                }));
                Ok(())
            }
        }
    }

    /// Fetch the executor for `name`, building and initializing it on first
    /// access. All callers observe the same instance.
    ///
    /// # Errors
    /// `NotConfigured` for unknown names; initialization errors pass
    /// through, leaving the slot empty so a later call can retry.
    pub fn get(&self, name: &str) -> Result<Arc<ManagedExecutor>, PoolError> {
        let entry = self
            .entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PoolError::NotConfigured(name.to_owned()))?;

        let mut slot = entry.slot.lock();
        if let Some(executor) = slot.as_ref() {
            return Ok(Arc::clone(executor));
        }
        let mut executor = ManagedExecutor::new(entry.spec.clone());
        if let Some(handler) = &self.handler {
            executor = executor.with_failure_handler(Arc::clone(handler));
        }
        let executor = Arc::new(executor);
        executor.initialize()?;
        info!(pool = name, "executor built on first access");
        *slot = Some(Arc::clone(&executor));
        Ok(executor)
    }

    /// True when `name` was declared.
    #[must_use]
    pub fn is_declared(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Declared pool names, in no particular order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Snapshots of every executor built so far.
    #[must_use]
    pub fn snapshots(&self) -> Vec<PoolSnapshot> {
        let entries: Vec<Arc<RegistryEntry>> = self.entries.read().values().cloned().collect();
        entries
            .iter()
            .filter_map(|entry| {
                let slot = entry.slot.lock();
                slot.as_ref().and_then(|executor| executor.snapshot().ok())
            })
            .collect()
    }

    /// Dispose every executor built so far. Declarations survive, but built
    /// executors are gone for good; infallible like
    /// [`ManagedExecutor::dispose`].
    pub fn dispose_all(&self) {
        info!("disposing all executors");
        let entries: Vec<Arc<RegistryEntry>> = self.entries.read().values().cloned().collect();
        for entry in entries {
            let slot = entry.slot.lock();
            if let Some(executor) = slot.as_ref() {
                executor.dispose();
            }
        }
    }
}
