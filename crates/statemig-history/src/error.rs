//! Error types for history ledgers

use std::path::PathBuf;

/// Ledger could not be read or appended
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// Filesystem failure
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded
    #[error("history encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Ledger backend refused the operation
    #[error("history ledger unavailable: {0}")]
    Unavailable(String),
}

impl HistoryError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
