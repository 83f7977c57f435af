//! Migrator phase machine
//!
//! ```text
//! Idle -> Locked -> Loaded -> Replayed -> Checked -> Committed
//!   \        \         \          \          \
//!    +--------+---------+----------+----------+--> Aborted
//! ```
//!
//! Plan runs end at `Checked`. `Committed` and `Aborted` are terminal.

use crate::error::PhaseError;
use std::fmt::{self, Display, Formatter};

/// Where a migration run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationPhase {
    Idle,
    Locked,
    Loaded,
    Replayed,
    Checked,
    Committed,
    Aborted,
}

impl MigrationPhase {
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

impl Display for MigrationPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Locked => "locked",
            Self::Loaded => "loaded",
            Self::Replayed => "replayed",
            Self::Checked => "checked",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        })
    }
}

/// Phases reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: MigrationPhase) -> Vec<MigrationPhase> {
    use MigrationPhase::{Aborted, Checked, Committed, Idle, Loaded, Locked, Replayed};
    match from {
        Idle => vec![Locked, Aborted],
        Locked => vec![Loaded, Aborted],
        Loaded => vec![Replayed, Aborted],
        Replayed => vec![Checked, Aborted],
        Checked => vec![Committed, Aborted],
        Committed | Aborted => vec![],
    }
}

/// Check a single phase change
///
/// # Errors
/// Returns [`PhaseError`] if `to` is not reachable from `from`
pub fn validate_transition(from: MigrationPhase, to: MigrationPhase) -> Result<(), PhaseError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PhaseError { from, to })
    }
}

/// Tracks and logs the phases of one run
#[derive(Debug)]
pub struct PhaseTracker {
    document: String,
    phase: MigrationPhase,
    visited: Vec<MigrationPhase>,
}

impl PhaseTracker {
    /// Tracker for a run of `document`, starting at `Idle`
    #[must_use]
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            phase: MigrationPhase::Idle,
            visited: vec![MigrationPhase::Idle],
        }
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    /// Every phase entered so far, in order
    #[inline]
    #[must_use]
    pub fn visited(&self) -> &[MigrationPhase] {
        &self.visited
    }

    /// Move to `to`
    ///
    /// # Errors
    /// Returns [`PhaseError`] for an illegal transition; the phase is unchanged
    pub fn advance(&mut self, to: MigrationPhase) -> Result<(), PhaseError> {
        validate_transition(self.phase, to)?;
        tracing::info!(
            document = %self.document,
            from = %self.phase,
            to = %to,
            "migration phase"
        );
        self.phase = to;
        self.visited.push(to);
        Ok(())
    }

    /// Move to `Aborted` unless already terminal
    pub fn abort(&mut self, reason: &dyn Display) {
        if self.phase.is_terminal() {
            return;
        }
        tracing::warn!(
            document = %self.document,
            from = %self.phase,
            "migration aborted: {reason}"
        );
        self.phase = MigrationPhase::Aborted;
        self.visited.push(MigrationPhase::Aborted);
    }
}
