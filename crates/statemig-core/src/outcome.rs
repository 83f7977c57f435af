//! Results of plan and apply runs

use crate::error::MigrateError;
use serde::Serialize;
use statemig_plan::PlanResult;
use statemig_state::DeploymentId;
use std::fmt::{self, Display, Formatter};

/// What a plan run found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReport {
    pub document: String,
    pub deployment: DeploymentId,
    pub plan: PlanResult,
    /// The document version is already in history; nothing was run
    pub already_applied: bool,
    /// An apply of the same document would commit
    pub would_commit: bool,
}

impl PlanReport {
    pub(crate) fn already_applied(document: impl Into<String>, deployment: DeploymentId) -> Self {
        Self {
            document: document.into(),
            deployment,
            plan: PlanResult::new(),
            already_applied: true,
            would_commit: false,
        }
    }
}

impl Display for PlanReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.already_applied {
            return write!(f, "{} ({}): already applied", self.document, self.deployment);
        }
        write!(f, "{} ({}): {}", self.document, self.deployment, self.plan)?;
        if self.would_commit && !self.plan.is_clean() {
            f.write_str(" (forced)")?;
        }
        Ok(())
    }
}

/// How an apply run ended without error
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// State written and recorded in history
    Committed { serial: u64, plan: PlanResult },
    /// This document version was committed before; nothing ran
    AlreadyApplied,
    /// State written, but the history append failed
    CommittedWithoutHistory {
        serial: u64,
        plan: PlanResult,
        reason: String,
    },
}

impl ApplyOutcome {
    /// Whether this run wrote state
    #[inline]
    #[must_use]
    pub fn committed(&self) -> bool {
        !matches!(self, Self::AlreadyApplied)
    }

    /// Serial of the written state, if any
    #[must_use]
    pub fn serial(&self) -> Option<u64> {
        match self {
            Self::Committed { serial, .. } | Self::CommittedWithoutHistory { serial, .. } => {
                Some(*serial)
            }
            Self::AlreadyApplied => None,
        }
    }
}

impl Display for ApplyOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed { serial, plan } => write!(f, "committed at serial {serial} ({plan})"),
            Self::AlreadyApplied => f.write_str("already applied"),
            Self::CommittedWithoutHistory { serial, reason, .. } => write!(
                f,
                "committed at serial {serial} but history was not recorded: {reason}"
            ),
        }
    }
}

/// Success flag and message handed to the process exit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub success: bool,
    pub reason: String,
}

impl RunReport {
    #[must_use]
    pub fn ok(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: reason.into(),
        }
    }
}

impl From<&ApplyOutcome> for RunReport {
    fn from(outcome: &ApplyOutcome) -> Self {
        match outcome {
            ApplyOutcome::CommittedWithoutHistory { .. } => Self::failed(outcome.to_string()),
            _ => Self::ok(outcome.to_string()),
        }
    }
}

impl From<&PlanReport> for RunReport {
    fn from(report: &PlanReport) -> Self {
        Self::ok(report.to_string())
    }
}

impl From<&MigrateError> for RunReport {
    fn from(err: &MigrateError) -> Self {
        Self::failed(format!("{}: {err}", err.kind()))
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let status = if self.success { "ok" } else { "failed" };
        write!(f, "{status}: {}", self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use statemig_plan::ChangeKind;

    #[test]
    fn degraded_commit_is_not_success() {
        let outcome = ApplyOutcome::CommittedWithoutHistory {
            serial: 8,
            plan: PlanResult::new(),
            reason: "disk full".to_string(),
        };
        let report = RunReport::from(&outcome);
        assert!(!report.success);
        assert!(report.reason.contains("disk full"));
        assert_eq!(outcome.serial(), Some(8));
        assert!(outcome.committed());
    }

    #[test]
    fn already_applied_is_success_without_serial() {
        let report = RunReport::from(&ApplyOutcome::AlreadyApplied);
        assert_eq!(report, RunReport::ok("already applied"));
        assert_eq!(ApplyOutcome::AlreadyApplied.serial(), None);
    }

    #[test]
    fn errors_carry_their_kind() {
        let err = MigrateError::DriftDetected {
            document: "split-db".to_string(),
            plan: Box::new(PlanResult::new().with_change("aws_instance.web", ChangeKind::Destroy)),
        };
        let report = RunReport::from(&err);
        assert!(!report.success);
        assert!(report.reason.starts_with("drift_detected: "));
        assert!(report.to_string().starts_with("failed: "));
    }

    #[test]
    fn plan_report_mentions_forced_commit() {
        let report = PlanReport {
            document: "split-db".to_string(),
            deployment: DeploymentId::new("envs/prod"),
            plan: PlanResult::new().with_change("aws_instance.web", ChangeKind::Update),
            already_applied: false,
            would_commit: true,
        };
        assert!(report.to_string().ends_with("(forced)"));

        let skipped = PlanReport::already_applied("split-db", DeploymentId::new("envs/prod"));
        assert_eq!(skipped.to_string(), "split-db (envs/prod:default): already applied");
    }
}
