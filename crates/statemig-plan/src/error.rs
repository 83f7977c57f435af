//! Error types for the diff oracle

use statemig_state::StateError;
use std::path::PathBuf;
use std::time::Duration;

/// The oracle could not produce a diff
///
/// Distinct from a non-clean plan, which is a successful answer.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// No answer within the configured bound
    #[error("diff oracle timed out after {0:?}")]
    Timeout(Duration),

    /// Oracle program could not be started
    #[error("failed to start diff oracle {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Oracle exited with a status that does not mean "diff produced"
    #[error("diff oracle exited with {}: {stderr}", exit_label(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// Oracle output could not be understood
    #[error("malformed diff oracle output: {0}")]
    MalformedOutput(String),

    /// Oracle input could not be prepared
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Candidate state could not be encoded
    #[error(transparent)]
    State(#[from] StateError),
}

#[allow(clippy::ref_option)]
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}"))
}

impl OracleError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
