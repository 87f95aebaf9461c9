//! Explicit handle bundle passed to every service constructor.

use std::sync::Arc;

use keel_core::Clock;

use crate::store::StateStore;
use crate::traits::{ClusterStore, InstanceStore, VersionStore};

/// Storage handles and the clock shared by the registry, the build
/// orchestrator and the tracker.
#[derive(Clone)]
pub struct ServiceContext {
    pub versions: Arc<dyn VersionStore>,
    pub clusters: Arc<dyn ClusterStore>,
    pub instances: Arc<dyn InstanceStore>,
    pub clock: Arc<dyn Clock>,
}

impl ServiceContext {
    pub fn new(
        versions: Arc<dyn VersionStore>,
        clusters: Arc<dyn ClusterStore>,
        instances: Arc<dyn InstanceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            versions,
            clusters,
            instances,
            clock,
        }
    }

    /// Back every collection with one redb store, sharing its clock.
    pub fn from_store(store: StateStore) -> Self {
        let clock = store.clock();
        let store = Arc::new(store);
        Self {
            versions: store.clone(),
            clusters: store.clone(),
            instances: store,
            clock,
        }
    }

    /// Ephemeral context for tests and dry runs.
    pub fn in_memory() -> crate::StateResult<Self> {
        Ok(Self::from_store(StateStore::open_in_memory()?))
    }

    /// Ephemeral context driven by `clock`.
    pub fn in_memory_with_clock(clock: Arc<dyn Clock>) -> crate::StateResult<Self> {
        Ok(Self::from_store(
            StateStore::open_in_memory()?.with_clock(clock),
        ))
    }
}
