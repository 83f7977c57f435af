//! Statemig Plan - safety check against live infrastructure
//!
//! Provides:
//! - [`DiffOracle`], the contract of the external diff tool
//! - [`PlanResult`], a per-address classification of its answer
//! - [`PlanChecker`], which bounds each oracle call with a timeout
//! - [`CommandOracle`], an oracle that drives an external executable

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod checker;
pub mod command;
pub mod error;
pub mod oracle;
pub mod result;

pub use checker::{PlanChecker, DEFAULT_ORACLE_TIMEOUT};
pub use command::{parse_plan_json, CommandOracle, STATE_PATH_ENV};
pub use error::OracleError;
pub use oracle::DiffOracle;
pub use result::{ChangeKind, PlanResult};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
