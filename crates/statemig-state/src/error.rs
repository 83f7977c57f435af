//! Error types for state backends

use crate::snapshot::DeploymentId;
use std::path::PathBuf;

/// Errors from reading, writing or locking durable state
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Another run holds the deployment lock
    #[error("state for {deployment} is locked by {holder}")]
    LockHeld {
        deployment: DeploymentId,
        holder: String,
    },

    /// Optimistic concurrency check failed on write
    #[error("state for {deployment} changed underneath this run: expected serial {expected}, found {actual}")]
    StaleState {
        deployment: DeploymentId,
        expected: u64,
        actual: u64,
    },

    /// Write would replace a state with a different history
    #[error("lineage mismatch for {deployment}: stored {stored}, writing {writing}")]
    LineageMismatch {
        deployment: DeploymentId,
        stored: String,
        writing: String,
    },

    /// Deployment names a location outside the state root
    #[error("invalid deployment {deployment}: {reason}")]
    InvalidDeployment {
        deployment: DeploymentId,
        reason: String,
    },

    /// Snapshot cannot be expressed as a state file
    #[error("inconsistent resource block {block}: {reason}")]
    InconsistentBlock { block: String, reason: String },

    /// Filesystem failure
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored state could not be decoded
    #[error("corrupt state: {0}")]
    Corrupt(String),

    /// State could not be encoded
    #[error("state encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StateError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for lock contention
    #[inline]
    #[must_use]
    pub fn is_lock_held(&self) -> bool {
        matches!(self, Self::LockHeld { .. })
    }

    /// True for a failed serial check
    #[inline]
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleState { .. })
    }
}
