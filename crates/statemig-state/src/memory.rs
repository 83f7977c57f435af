//! In-memory backend
//!
//! Keeps snapshots and locks in `DashMap`s. Cloning shares the same store,
//! so a test can hand one clone to the engine and inspect another.

use crate::backend::{LockHandle, LockInfo, StateBackend};
use crate::error::StateError;
use crate::snapshot::{DeploymentId, StateSnapshot};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Store {
    states: DashMap<DeploymentId, StateSnapshot>,
    locks: DashMap<DeploymentId, LockInfo>,
    writes: AtomicU64,
}

/// Process-local state storage
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    store: Arc<Store>,
}

impl MemoryBackend {
    /// Empty backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot as-is, serial included
    pub fn seed(&self, deployment: DeploymentId, snapshot: StateSnapshot) {
        self.store.states.insert(deployment, snapshot);
    }

    /// Stored snapshot, if any
    #[must_use]
    pub fn snapshot(&self, deployment: &DeploymentId) -> Option<StateSnapshot> {
        self.store.states.get(deployment).map(|s| s.clone())
    }

    /// Simulate a writer outside this engine: mutate and bump the serial
    pub fn external_write(&self, deployment: &DeploymentId, f: impl FnOnce(&mut StateSnapshot)) {
        let mut entry = self
            .store
            .states
            .entry(deployment.clone())
            .or_default();
        f(&mut entry);
        entry.serial += 1;
    }

    /// Number of successful [`StateBackend::write`] calls
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.store.writes.load(Ordering::SeqCst)
    }

    /// Whether a lock is currently held
    #[must_use]
    pub fn is_locked(&self, deployment: &DeploymentId) -> bool {
        self.store.locks.contains_key(deployment)
    }
}

#[async_trait::async_trait]
impl StateBackend for MemoryBackend {
    async fn acquire_lock(&self, deployment: &DeploymentId) -> Result<LockHandle, StateError> {
        let info = match self.store.locks.entry(deployment.clone()) {
            Entry::Occupied(held) => {
                return Err(StateError::LockHeld {
                    deployment: deployment.clone(),
                    holder: held.get().to_string(),
                })
            }
            Entry::Vacant(slot) => slot
                .insert(LockInfo::for_current_process(deployment.clone()))
                .clone(),
        };

        let store = Arc::clone(&self.store);
        let key = deployment.clone();
        let id = info.id;
        Ok(LockHandle::new(info, move || {
            store.locks.remove_if(&key, |_, held| held.id == id);
            Ok(())
        }))
    }

    async fn read(&self, deployment: &DeploymentId) -> Result<StateSnapshot, StateError> {
        Ok(self.snapshot(deployment).unwrap_or_default())
    }

    async fn write(
        &self,
        deployment: &DeploymentId,
        snapshot: &StateSnapshot,
        expected_serial: u64,
    ) -> Result<u64, StateError> {
        let serial = expected_serial + 1;
        match self.store.states.entry(deployment.clone()) {
            Entry::Occupied(mut current) => {
                let actual = current.get().serial();
                if actual != expected_serial {
                    return Err(StateError::StaleState {
                        deployment: deployment.clone(),
                        expected: expected_serial,
                        actual,
                    });
                }
                if current.get().lineage() != snapshot.lineage() {
                    return Err(StateError::LineageMismatch {
                        deployment: deployment.clone(),
                        stored: current.get().lineage().to_string(),
                        writing: snapshot.lineage().to_string(),
                    });
                }
                current.insert(snapshot.clone().with_serial(serial));
            }
            Entry::Vacant(slot) => {
                if expected_serial != 0 {
                    return Err(StateError::StaleState {
                        deployment: deployment.clone(),
                        expected: expected_serial,
                        actual: 0,
                    });
                }
                slot.insert(snapshot.clone().with_serial(serial));
            }
        }
        self.store.writes.fetch_add(1, Ordering::SeqCst);
        Ok(serial)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
