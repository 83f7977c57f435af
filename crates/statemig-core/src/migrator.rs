//! The plan-gated migrator
//!
//! One run of a document goes through [`MigrationPhase`]s in order:
//! lock the deployment, read its state, replay the document's actions on a
//! working copy, diff the working copy against live infrastructure and,
//! for apply, write it back with the serial read at the start.
//!
//! Nothing durable changes unless the diff is clean or the document is
//! forced. The lock is released once on every exit path.

use crate::config::MigratorConfig;
use crate::document::MigrationDocument;
use crate::error::{MigrateError, PhaseError};
use crate::outcome::{ApplyOutcome, PlanReport};
use crate::phase::{MigrationPhase, PhaseTracker};
use statemig_action::ActionExecutor;
use statemig_history::{FileLedger, HistoryLedger, HistoryRecord};
use statemig_plan::{CommandOracle, PlanChecker, PlanResult};
use statemig_state::{DeploymentId, LocalBackend, StateBackend};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Environment variable carrying the workspace to the oracle
pub const WORKSPACE_ENV: &str = "STATEMIG_WORKSPACE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Plan,
    Apply,
}

enum Finished {
    /// Another run recorded the document while this one waited
    Skipped,
    Checked(PlanResult),
    Committed(ApplyOutcome),
}

/// Runs migration documents against one state backend
#[derive(Clone)]
pub struct Migrator {
    backend: Arc<dyn StateBackend>,
    checker: PlanChecker,
    ledger: Arc<dyn HistoryLedger>,
    executor: ActionExecutor,
}

impl Migrator {
    #[must_use]
    pub fn new(
        backend: Arc<dyn StateBackend>,
        checker: PlanChecker,
        ledger: Arc<dyn HistoryLedger>,
    ) -> Self {
        Self {
            backend,
            checker,
            ledger,
            executor: ActionExecutor::new(),
        }
    }

    /// Local-disk backend, command oracle and file ledger from config
    ///
    /// The oracle runs in the deployment's directory under `state_root`
    /// with the workspace exported as `STATEMIG_WORKSPACE`.
    #[must_use]
    pub fn from_config(config: &MigratorConfig, deployment: &DeploymentId) -> Self {
        let backend = LocalBackend::new(&config.state_root).with_lease(config.lock_lease());

        let mut env: BTreeMap<String, String> = config.oracle.env.clone();
        env.insert(WORKSPACE_ENV.to_string(), deployment.workspace().to_string());
        let oracle = CommandOracle::new(&config.oracle.program)
            .with_args(config.oracle.args.iter())
            .with_env(env)
            .with_working_dir(config.state_root.join(deployment.dir()));
        let checker = PlanChecker::new(Arc::new(oracle)).with_timeout(config.oracle_timeout());

        let ledger = FileLedger::new(&config.history.path);
        Self::new(Arc::new(backend), checker, Arc::new(ledger))
    }

    /// History ledger this migrator records to
    #[inline]
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn HistoryLedger> {
        &self.ledger
    }

    /// Replay and check `document` without writing anything
    ///
    /// A document already recorded in history is not run.
    ///
    /// # Errors
    /// Any [`MigrateError`] short of a commit failure; a divergent plan of
    /// an unforced document is [`MigrateError::DriftDetected`]
    pub async fn plan(&self, document: &MigrationDocument) -> Result<PlanReport, MigrateError> {
        if self.already_applied(document).await? {
            return Ok(PlanReport::already_applied(
                document.name(),
                document.deployment().clone(),
            ));
        }

        let plan = match self.run(document, Mode::Plan).await? {
            Finished::Checked(plan) => plan,
            Finished::Skipped => {
                return Ok(PlanReport::already_applied(
                    document.name(),
                    document.deployment().clone(),
                ))
            }
            Finished::Committed(_) => return Err(past_check().into()),
        };
        Ok(PlanReport {
            document: document.name().to_string(),
            deployment: document.deployment().clone(),
            plan,
            already_applied: false,
            would_commit: true,
        })
    }

    /// Replay, check and commit `document`
    ///
    /// # Errors
    /// - [`MigrateError::LockHeld`] if another run holds the deployment
    /// - [`MigrateError::Action`] if an action cannot be applied
    /// - [`MigrateError::Oracle`] if the diff could not be produced
    /// - [`MigrateError::DriftDetected`] for a divergent, unforced plan
    /// - [`MigrateError::StaleState`] if the state moved during the run
    pub async fn apply(&self, document: &MigrationDocument) -> Result<ApplyOutcome, MigrateError> {
        if self.already_applied(document).await? {
            tracing::info!(
                document = document.name(),
                digest = %document.digest().short(),
                "already applied; skipping"
            );
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        match self.run(document, Mode::Apply).await? {
            Finished::Committed(outcome) => Ok(outcome),
            Finished::Skipped => Ok(ApplyOutcome::AlreadyApplied),
            Finished::Checked(_) => Err(past_check().into()),
        }
    }

    async fn already_applied(&self, document: &MigrationDocument) -> Result<bool, MigrateError> {
        Ok(self
            .ledger
            .has_applied(document.name(), document.digest())
            .await?)
    }

    async fn run(
        &self,
        document: &MigrationDocument,
        mode: Mode,
    ) -> Result<Finished, MigrateError> {
        let deployment = document.deployment();
        let mut tracker = PhaseTracker::new(document.name());

        let lock = match self.backend.acquire_lock(deployment).await {
            Ok(lock) => lock,
            Err(e) => {
                let err = MigrateError::from(e);
                tracker.abort(&err);
                return Err(err);
            }
        };

        let result = self.locked(document, mode, &mut tracker).await;

        if let Err(e) = self.backend.release_lock(lock).await {
            tracing::error!(%deployment, "failed to release lock: {e}");
        }
        if let Err(e) = &result {
            tracker.abort(e);
        }
        result
    }

    async fn locked(
        &self,
        document: &MigrationDocument,
        mode: Mode,
        tracker: &mut PhaseTracker,
    ) -> Result<Finished, MigrateError> {
        let deployment = document.deployment();
        tracker.advance(MigrationPhase::Locked)?;
        if self.already_applied(document).await? {
            tracing::info!(
                document = document.name(),
                "recorded by another run while waiting for the lock; skipping"
            );
            return Ok(Finished::Skipped);
        }

        let current = self.backend.read(deployment).await?;
        let expected_serial = current.serial();
        tracker.advance(MigrationPhase::Loaded)?;

        let working = self
            .executor
            .replay(current, document.actions())
            .map_err(|(index, source)| MigrateError::Action { index, source })?;
        tracker.advance(MigrationPhase::Replayed)?;

        let plan = self.checker.check(&working).await?;
        if !plan.is_clean() {
            if !document.force() {
                return Err(MigrateError::DriftDetected {
                    document: document.name().to_string(),
                    plan: Box::new(plan),
                });
            }
            tracing::warn!(
                document = document.name(),
                divergent = plan.divergent().len(),
                "plan is not clean; continuing because the document is forced"
            );
        }
        tracker.advance(MigrationPhase::Checked)?;

        if mode == Mode::Plan {
            return Ok(Finished::Checked(plan));
        }

        let serial = self.backend.write(deployment, &working, expected_serial).await?;
        tracker.advance(MigrationPhase::Committed)?;
        tracing::info!(
            document = document.name(),
            %deployment,
            backend = self.backend.name(),
            serial,
            "state committed"
        );

        let record = HistoryRecord::new(document.name(), *document.digest(), deployment.clone())
            .with_forced(!plan.is_clean());
        let outcome = match self.ledger.record(record).await {
            Ok(()) => ApplyOutcome::Committed { serial, plan },
            Err(e) => {
                tracing::warn!(
                    document = document.name(),
                    "state committed but history append failed: {e}"
                );
                ApplyOutcome::CommittedWithoutHistory {
                    serial,
                    plan,
                    reason: e.to_string(),
                }
            }
        };
        Ok(Finished::Committed(outcome))
    }
}

fn past_check() -> PhaseError {
    PhaseError {
        from: MigrationPhase::Checked,
        to: MigrationPhase::Committed,
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("backend", &self.backend.name())
            .field("checker", &self.checker)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn from_config_uses_configured_paths() {
        let config = MigratorConfig::default()
            .with_state_root("/srv/iac")
            .with_history_path("/srv/iac/history.jsonl")
            .with_oracle_timeout(std::time::Duration::from_secs(42));
        let migrator =
            Migrator::from_config(&config, &DeploymentId::new("envs/prod").with_workspace("blue"));

        assert_eq!(migrator.checker.timeout(), std::time::Duration::from_secs(42));
        assert_eq!(migrator.backend.name(), "local");
        assert!(format!("{migrator:?}").contains("local"));
    }
}
