//! Diff oracle contract

use crate::error::OracleError;
use crate::result::PlanResult;
use statemig_state::StateSnapshot;

/// External tool that compares a candidate state with live infrastructure
/// and the configuration
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DiffOracle: Send + Sync {
    /// Diff the configuration against `state`
    ///
    /// # Errors
    /// Returns [`OracleError`] when no diff could be produced; a diff with
    /// changes is a successful result
    async fn diff(&self, state: &StateSnapshot) -> Result<PlanResult, OracleError>;

    /// Short oracle name for logs
    fn name(&self) -> &'static str;
}
