//! Statemig State - durable deployment state
//!
//! Provides:
//! - Resource addressing (`module.db.aws_db_instance.main`, `aws_instance.web[0]`)
//! - [`StateSnapshot`], the versioned record of one deployment's resources
//! - The Terraform v4 state file codec
//! - The [`StateBackend`] contract with local-disk and in-memory backends
//!
//! # Example
//!
//! ```rust,ignore
//! use statemig_state::{DeploymentId, LocalBackend, StateBackend};
//!
//! # async fn example() -> Result<(), statemig_state::StateError> {
//! let backend = LocalBackend::new("/srv/state");
//! let deployment = DeploymentId::new("envs/prod");
//!
//! let lock = backend.acquire_lock(&deployment).await?;
//! let state = backend.read(&deployment).await?;
//! let serial = backend.write(&deployment, &state, state.serial()).await?;
//! backend.release_lock(lock).await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod address;
pub mod backend;
pub mod error;
pub mod hash;
pub mod local;
pub mod memory;
pub mod snapshot;
pub mod tfstate;

pub use address::{AddressError, InstanceKey, ModuleStep, ResourceAddress, ResourceMode, ResourceRef};
pub use backend::{LockHandle, LockInfo, StateBackend};
pub use error::StateError;
pub use hash::{ContentHash, HashError};
pub use local::{LocalBackend, DEFAULT_LOCK_LEASE};
pub use memory::MemoryBackend;
pub use snapshot::{DeploymentId, ResourceRecord, StateSnapshot, DEFAULT_WORKSPACE};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
