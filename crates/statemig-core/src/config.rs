//! Migrator configuration
//!
//! Loaded from a TOML file (default `.statemig.toml`):
//!
//! ```toml
//! migration_dir = "migrations"
//! state_root = "."
//! lock_lease_secs = 900
//!
//! [history]
//! path = ".statemig/history.jsonl"
//!
//! [oracle]
//! program = "./bin/plan-json"
//! args = ["-lock=false"]
//! timeout_secs = 300
//! env = { TF_IN_AUTOMATION = "1" }
//! ```
//!
//! Relative paths are resolved against the directory holding the file.
//! `STATEMIG_EXEC_PATH` overrides `oracle.program`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "STATEMIG_CONFIG";
/// Environment variable overriding the oracle program
pub const EXEC_PATH_ENV: &str = "STATEMIG_EXEC_PATH";
/// Environment variable holding the log filter
pub const LOG_ENV: &str = "STATEMIG_LOG";
/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = ".statemig.toml";

/// Where committed documents are recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".statemig/history.jsonl"),
        }
    }
}

/// How to run the diff oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OracleConfig {
    /// Program printing plan JSON for the state file given as last argument
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub env: BTreeMap<String, String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("statemig-oracle"),
            args: Vec::new(),
            timeout_secs: 300,
            env: BTreeMap::new(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigratorConfig {
    /// Directory scanned for documents when no path is given
    pub migration_dir: PathBuf,
    /// Root the local state backend resolves deployment dirs against
    pub state_root: PathBuf,
    /// Age after which a left-over lock is evicted
    pub lock_lease_secs: u64,
    pub history: HistoryConfig,
    pub oracle: OracleConfig,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            migration_dir: PathBuf::from("migrations"),
            state_root: PathBuf::from("."),
            lock_lease_secs: 900,
            history: HistoryConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl MigratorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_migration_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migration_dir = dir.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_state_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.state_root = root.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history.path = path.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_oracle_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.oracle.program = program.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle.timeout_secs = timeout.as_secs();
        self
    }

    #[inline]
    #[must_use]
    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock_lease_secs)
    }

    #[inline]
    #[must_use]
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle.timeout_secs)
    }

    /// Parse TOML and check values
    ///
    /// # Errors
    /// Returns [`ConfigError`] for invalid TOML, unknown keys or
    /// out-of-range values
    pub fn from_toml(source: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file and resolve its relative paths
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or is invalid
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml(&source, path)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.resolve_relative(base))
    }

    /// Find and load configuration
    ///
    /// An explicit path, or `STATEMIG_CONFIG`, must exist. Otherwise
    /// `.statemig.toml` is used if present and defaults if not. Environment
    /// overrides are applied last.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a named file is missing or invalid
    pub async fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let config = match named {
            Some(path) => Self::load(&path).await?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if tokio::fs::try_exists(default).await.unwrap_or(false) {
                    Self::load(default).await?
                } else {
                    tracing::debug!("no {DEFAULT_CONFIG_FILE}; using defaults");
                    Self::default()
                }
            }
        };
        let config = config.with_env_overrides(|key| std::env::var(key).ok());
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(program) = lookup(EXEC_PATH_ENV).filter(|p| !p.is_empty()) {
            self.oracle.program = PathBuf::from(program);
        }
        self
    }

    /// Resolve relative paths against `base`
    #[must_use]
    pub fn resolve_relative(mut self, base: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.migration_dir);
        resolve(&mut self.state_root);
        resolve(&mut self.history.path);
        if self.oracle.program.components().count() > 1 {
            resolve(&mut self.oracle.program);
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.oracle.timeout_secs == 0 {
            return Err(ConfigError::Invalid("oracle.timeout_secs must be positive".to_string()));
        }
        if self.oracle.program.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("oracle.program is empty".to_string()));
        }
        if self.lock_lease_secs == 0 {
            return Err(ConfigError::Invalid("lock_lease_secs must be positive".to_string()));
        }
        Ok(())
    }
}
