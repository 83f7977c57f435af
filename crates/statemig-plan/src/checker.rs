//! Plan checker
//!
//! Runs the diff oracle against a candidate state under a time bound.

use crate::error::OracleError;
use crate::oracle::DiffOracle;
use crate::result::PlanResult;
use statemig_state::StateSnapshot;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default bound on a single oracle call
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Invokes a [`DiffOracle`] and classifies its answer
#[derive(Clone)]
pub struct PlanChecker {
    oracle: Arc<dyn DiffOracle>,
    timeout: Duration,
}

impl PlanChecker {
    /// Checker with the default timeout
    #[must_use]
    pub fn new(oracle: Arc<dyn DiffOracle>) -> Self {
        Self {
            oracle,
            timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }

    /// With a custom timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Diff `state` against live infrastructure
    ///
    /// # Errors
    /// - [`OracleError::Timeout`] if the oracle does not answer in time
    /// - any error the oracle itself reports
    pub async fn check(&self, state: &StateSnapshot) -> Result<PlanResult, OracleError> {
        let started = Instant::now();
        let plan = tokio::time::timeout(self.timeout, self.oracle.diff(state))
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))??;

        tracing::info!(
            oracle = self.oracle.name(),
            clean = plan.is_clean(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "plan checked: {plan}"
        );
        Ok(plan)
    }
}

impl std::fmt::Debug for PlanChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanChecker")
            .field("oracle", &self.oracle.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockDiffOracle;
    use crate::result::ChangeKind;

    fn mock(result: fn() -> Result<PlanResult, OracleError>) -> MockDiffOracle {
        let mut oracle = MockDiffOracle::new();
        oracle.expect_name().return_const("mock");
        oracle.expect_diff().times(1).returning(move |_| result());
        oracle
    }

    #[tokio::test]
    async fn passes_through_clean_plan() {
        let checker = PlanChecker::new(Arc::new(mock(|| Ok(PlanResult::new()))));
        let plan = checker.check(&StateSnapshot::empty()).await.unwrap();
        assert!(plan.is_clean());
    }

    #[tokio::test]
    async fn divergent_plan_is_not_an_error() {
        let checker = PlanChecker::new(Arc::new(mock(|| {
            Ok(PlanResult::new().with_change("aws_instance.web", ChangeKind::Destroy))
        })));
        let plan = checker.check(&StateSnapshot::empty()).await.unwrap();
        assert_eq!(plan.count(ChangeKind::Destroy), 1);
    }

    #[tokio::test]
    async fn oracle_errors_propagate() {
        let checker = PlanChecker::new(Arc::new(mock(|| {
            Err(OracleError::MalformedOutput("not json".to_string()))
        })));
        let err = checker.check(&StateSnapshot::empty()).await.unwrap_err();
        assert!(matches!(err, OracleError::MalformedOutput(_)));
    }

    struct SlowOracle;

    #[async_trait::async_trait]
    impl DiffOracle for SlowOracle {
        async fn diff(&self, _state: &StateSnapshot) -> Result<PlanResult, OracleError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(PlanResult::new())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_oracle_times_out() {
        let checker = PlanChecker::new(Arc::new(SlowOracle)).with_timeout(Duration::from_secs(5));
        let err = checker.check(&StateSnapshot::empty()).await.unwrap_err();
        assert!(matches!(err, OracleError::Timeout(d) if d == Duration::from_secs(5)));
    }
}
