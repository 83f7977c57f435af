//! Statemig History - idempotent re-invocation
//!
//! Records which migration documents have been committed so that applying
//! the same document version twice is a no-op.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod ledger;
pub mod record;

pub use error::HistoryError;
pub use ledger::{FileLedger, HistoryLedger, MemoryLedger};
pub use record::HistoryRecord;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
