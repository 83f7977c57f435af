//! Statemig Action - primitive state edits
//!
//! Provides:
//! - [`Action`], the closed set of state edits (move, import, remove,
//!   forget, wildcard move, provider replacement)
//! - The shell-like command form documents use (`mv module.db module.db_primary`)
//! - [`ActionExecutor`], which replays actions against a working copy
//!
//! # Example
//!
//! ```rust,ignore
//! use statemig_action::{Action, ActionExecutor};
//!
//! let actions = Action::parse_line("mv module.db module.db_primary")?;
//! let working = ActionExecutor::new().replay(state, &actions)?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod action;
pub mod error;
pub mod executor;
pub mod wildcard;

pub use action::Action;
pub use error::{ActionError, ActionParseError};
pub use executor::ActionExecutor;
pub use wildcard::WildcardMove;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
