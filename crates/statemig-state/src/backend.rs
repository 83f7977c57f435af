//! State backend contract
//!
//! A [`StateBackend`] owns the durable state blob of every deployment it
//! serves. It is the only writer of durable state; callers get copies.
//!
//! Locking is scoped: [`StateBackend::acquire_lock`] hands out a
//! [`LockHandle`] whose release action runs exactly once, either through
//! [`StateBackend::release_lock`] or when the handle is dropped.

use crate::error::StateError;
use crate::snapshot::{DeploymentId, StateSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who holds a lock and since when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock id
    pub id: Uuid,
    /// Locked deployment
    pub deployment: DeploymentId,
    /// `user@host`-style holder description
    pub who: String,
    /// Acquisition time
    pub created: DateTime<Utc>,
}

impl LockInfo {
    /// Lock info for the current process
    #[must_use]
    pub fn for_current_process(deployment: DeploymentId) -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            id: Uuid::new_v4(),
            deployment,
            who: format!("{user}@pid{}", std::process::id()),
            created: Utc::now(),
        }
    }
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (lock {}, since {})", self.who, self.id, self.created.to_rfc3339())
    }
}

type ReleaseFn = Box<dyn FnOnce() -> Result<(), StateError> + Send>;

/// Held deployment lock
///
/// Dropping the handle releases the lock; errors during a drop-time
/// release are logged.
pub struct LockHandle {
    info: LockInfo,
    release: Option<ReleaseFn>,
}

impl LockHandle {
    /// Wrap a lock with the action that releases it
    pub fn new(
        info: LockInfo,
        release: impl FnOnce() -> Result<(), StateError> + Send + 'static,
    ) -> Self {
        Self {
            info,
            release: Some(Box::new(release)),
        }
    }

    /// Lock details
    #[inline]
    #[must_use]
    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Release now, reporting failures
    ///
    /// # Errors
    /// Returns whatever the backend's release action reports
    pub fn release(mut self) -> Result<(), StateError> {
        match self.release.take() {
            Some(release) => release(),
            None => Ok(()),
        }
    }
}

impl LockHandle {
    /// Give up the release action and return the lock details
    ///
    /// For backends whose [`StateBackend::release_lock`] does its own
    /// asynchronous release.
    #[must_use]
    pub fn disarm(mut self) -> LockInfo {
        self.release = None;
        self.info.clone()
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            tracing::warn!(
                deployment = %self.info.deployment,
                lock = %self.info.id,
                "lock released on drop"
            );
            if let Err(e) = release() {
                tracing::error!(deployment = %self.info.deployment, "failed to release lock: {e}");
            }
        }
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("info", &self.info)
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// Durable, lockable, versioned state storage
#[async_trait::async_trait]
pub trait StateBackend: Send + Sync {
    /// Take the deployment lock
    ///
    /// # Errors
    /// - [`StateError::LockHeld`] if another holder has it; never waits
    async fn acquire_lock(&self, deployment: &DeploymentId) -> Result<LockHandle, StateError>;

    /// Current snapshot; an absent state reads as empty with serial 0
    async fn read(&self, deployment: &DeploymentId) -> Result<StateSnapshot, StateError>;

    /// Persist `snapshot` if the stored serial still equals `expected_serial`
    ///
    /// The stored copy gets serial `expected_serial + 1`, which is returned.
    ///
    /// # Errors
    /// - [`StateError::StaleState`] if the serial moved since it was read
    async fn write(
        &self,
        deployment: &DeploymentId,
        snapshot: &StateSnapshot,
        expected_serial: u64,
    ) -> Result<u64, StateError>;

    /// Release a lock taken by [`StateBackend::acquire_lock`]
    async fn release_lock(&self, handle: LockHandle) -> Result<(), StateError> {
        handle.release()
    }

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
