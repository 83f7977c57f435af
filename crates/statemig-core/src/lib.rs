//! Statemig Core - plan-gated state migrations
//!
//! Provides:
//! - [`MigrationDocument`], parsed from TOML, YAML or JSON
//! - [`MigratorConfig`], the TOML configuration with environment overrides
//! - [`Migrator`], which locks a deployment, replays a document, checks the
//!   result against live infrastructure and commits it
//! - Directory listing with history status
//!
//! # Example
//!
//! ```rust,ignore
//! use statemig_core::prelude::*;
//!
//! let config = MigratorConfig::discover(None).await?;
//! let document = MigrationDocument::load("migrations/001_split_db.toml").await?;
//! let migrator = Migrator::from_config(&config, document.deployment());
//!
//! let report = migrator.plan(&document).await?;
//! println!("{report}");
//! match migrator.apply(&document).await? {
//!     ApplyOutcome::Committed { serial, .. } => println!("committed at {serial}"),
//!     other => println!("{other}"),
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod document;
pub mod error;
pub mod listing;
pub mod migrator;
pub mod outcome;
pub mod phase;

pub use config::{
    HistoryConfig, MigratorConfig, OracleConfig, CONFIG_ENV, DEFAULT_CONFIG_FILE, EXEC_PATH_ENV,
    LOG_ENV,
};
pub use document::{DocumentFormat, MigrationDocument};
pub use error::{ConfigError, MigrateError, ParseError, PhaseError};
pub use listing::{list_documents, pending_documents, DocumentEntry, DocumentStatus, StatusFilter};
pub use migrator::{Migrator, WORKSPACE_ENV};
pub use outcome::{ApplyOutcome, PlanReport, RunReport};
pub use phase::{allowed_transitions, validate_transition, MigrationPhase, PhaseTracker};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::MigratorConfig;
    pub use crate::document::MigrationDocument;
    pub use crate::error::MigrateError;
    pub use crate::migrator::Migrator;
    pub use crate::outcome::{ApplyOutcome, PlanReport, RunReport};
    pub use statemig_state::{DeploymentId, StateBackend, StateSnapshot};
}
