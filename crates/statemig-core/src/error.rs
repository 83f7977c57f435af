//! Error types for the migration engine

use crate::phase::MigrationPhase;
use statemig_action::{ActionError, ActionParseError};
use statemig_history::HistoryError;
use statemig_plan::{OracleError, PlanResult};
use statemig_state::{DeploymentId, StateError};
use std::path::PathBuf;

/// Migration document could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Document file could not be read
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File extension is not toml, yaml, yml or json
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(PathBuf),

    /// Document is not valid in its format
    #[error("invalid {format} document: {message}")]
    Syntax {
        format: &'static str,
        message: String,
    },

    /// No `name` and no file to take one from
    #[error("document has no name")]
    MissingName,

    /// `name` is unusable
    #[error("invalid document name `{0}`")]
    InvalidName(String),

    /// `actions` is empty
    #[error("document `{0}` has no actions")]
    EmptyActions(String),

    /// One action string is malformed
    #[error("action {} (`{line}`): {source}", .index + 1)]
    InvalidAction {
        index: usize,
        line: String,
        #[source]
        source: ActionParseError,
    },
}

impl ParseError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Configuration could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Illegal migrator phase change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal phase transition {from} -> {to}")]
pub struct PhaseError {
    pub from: MigrationPhase,
    pub to: MigrationPhase,
}

/// Why a plan or apply run failed
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Another run holds the deployment lock
    #[error("state for {deployment} is locked by {holder}")]
    LockHeld {
        deployment: DeploymentId,
        holder: String,
    },

    /// The state changed between read and write
    #[error("state for {deployment} changed during the run (expected serial {expected}, found {actual}); nothing was written")]
    StaleState {
        deployment: DeploymentId,
        expected: u64,
        actual: u64,
    },

    /// Any other backend failure
    #[error(transparent)]
    State(StateError),

    /// An action could not be applied
    #[error("action {} failed: {source}", .index + 1)]
    Action {
        index: usize,
        #[source]
        source: ActionError,
    },

    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// The migrated state disagrees with live infrastructure
    #[error("plan for `{document}` is not clean: {plan}")]
    DriftDetected {
        document: String,
        plan: Box<PlanResult>,
    },

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Phase(#[from] PhaseError),
}

impl From<StateError> for MigrateError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::LockHeld { deployment, holder } => Self::LockHeld { deployment, holder },
            StateError::StaleState {
                deployment,
                expected,
                actual,
            } => Self::StaleState {
                deployment,
                expected,
                actual,
            },
            other => Self::State(other),
        }
    }
}

impl MigrateError {
    /// Whether re-running the same document may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockHeld { .. } | Self::StaleState { .. })
    }

    /// Stable short label
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse_error",
            Self::Config(_) => "config_error",
            Self::LockHeld { .. } => "lock_held",
            Self::StaleState { .. } => "stale_state",
            Self::State(_) => "state_error",
            Self::Action { source, .. } => source.kind(),
            Self::Oracle(_) => "oracle_error",
            Self::DriftDetected { .. } => "drift_detected",
            Self::History(_) => "history_error",
            Self::Phase(_) => "phase_error",
        }
    }
}
