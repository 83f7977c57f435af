//! Plan classification
//!
//! A [`PlanResult`] maps every address the oracle reported to a
//! [`ChangeKind`]. The plan is clean only when every address is
//! [`ChangeKind::NoChange`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// What applying the configuration would do to one address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    NoChange,
    Create,
    Update,
    Destroy,
    Unknown,
}

impl ChangeKind {
    /// Classify a plan JSON `change.actions` list
    ///
    /// `["no-op"]` and `["read"]` are no-change; any replace pair counts as
    /// a destroy.
    #[must_use]
    pub fn from_plan_actions<S: AsRef<str>>(actions: &[S]) -> Self {
        let actions: Vec<&str> = actions.iter().map(AsRef::as_ref).collect();
        match actions.as_slice() {
            ["no-op"] | ["read"] => Self::NoChange,
            ["create"] => Self::Create,
            ["update"] => Self::Update,
            ["delete"] | ["delete", "create"] | ["create", "delete"] => Self::Destroy,
            _ => Self::Unknown,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_change(self) -> bool {
        self != Self::NoChange
    }
}

impl Display for ChangeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoChange => "no-change",
            Self::Create => "create",
            Self::Update => "update",
            Self::Destroy => "destroy",
            Self::Unknown => "unknown",
        })
    }
}

/// Per-address classification of an oracle diff
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanResult {
    changes: BTreeMap<String, ChangeKind>,
}

impl PlanResult {
    /// Empty (clean) plan
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With one classified address
    #[must_use]
    pub fn with_change(mut self, address: impl Into<String>, kind: ChangeKind) -> Self {
        self.insert(address, kind);
        self
    }

    /// Record one address; a later report for the same address wins
    pub fn insert(&mut self, address: impl Into<String>, kind: ChangeKind) {
        self.changes.insert(address.into(), kind);
    }

    /// All classified addresses
    #[inline]
    #[must_use]
    pub fn changes(&self) -> &BTreeMap<String, ChangeKind> {
        &self.changes
    }

    /// True iff every address is no-change
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.changes.values().all(|k| !k.is_change())
    }

    /// Number of addresses with the given classification
    #[must_use]
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.values().filter(|k| **k == kind).count()
    }

    /// Addresses that would change, in address order
    #[must_use]
    pub fn divergent(&self) -> Vec<(&str, ChangeKind)> {
        self.changes
            .iter()
            .filter(|(_, k)| k.is_change())
            .map(|(a, k)| (a.as_str(), *k))
            .collect()
    }

    /// `N to add, N to change, N to destroy, N unknown`
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} to add, {} to change, {} to destroy, {} unknown",
            self.count(ChangeKind::Create),
            self.count(ChangeKind::Update),
            self.count(ChangeKind::Destroy),
            self.count(ChangeKind::Unknown),
        )
    }
}

impl FromIterator<(String, ChangeKind)> for PlanResult {
    fn from_iter<I: IntoIterator<Item = (String, ChangeKind)>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}

impl Display for PlanResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return f.write_str("no changes");
        }
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_plan_actions() {
        assert_eq!(ChangeKind::from_plan_actions(&["no-op"]), ChangeKind::NoChange);
        assert_eq!(ChangeKind::from_plan_actions(&["read"]), ChangeKind::NoChange);
        assert_eq!(ChangeKind::from_plan_actions(&["create"]), ChangeKind::Create);
        assert_eq!(ChangeKind::from_plan_actions(&["update"]), ChangeKind::Update);
        assert_eq!(ChangeKind::from_plan_actions(&["delete"]), ChangeKind::Destroy);
        assert_eq!(
            ChangeKind::from_plan_actions(&["create", "delete"]),
            ChangeKind::Destroy
        );
        assert_eq!(
            ChangeKind::from_plan_actions(&["delete", "create"]),
            ChangeKind::Destroy
        );
        assert_eq!(ChangeKind::from_plan_actions(&["forget"]), ChangeKind::Unknown);
        assert_eq!(ChangeKind::from_plan_actions::<&str>(&[]), ChangeKind::Unknown);
    }

    #[test]
    fn empty_plan_is_clean() {
        let plan = PlanResult::new();
        assert!(plan.is_clean());
        assert_eq!(plan.to_string(), "no changes");
    }

    #[test]
    fn any_change_makes_plan_divergent() {
        let plan = PlanResult::new()
            .with_change("aws_instance.web", ChangeKind::NoChange)
            .with_change("aws_s3_bucket.logs", ChangeKind::Create)
            .with_change("module.db.aws_db_instance.main", ChangeKind::Destroy)
            .with_change("aws_iam_role.r", ChangeKind::Unknown);

        assert!(!plan.is_clean());
        assert_eq!(
            plan.divergent(),
            vec![
                ("aws_iam_role.r", ChangeKind::Unknown),
                ("aws_s3_bucket.logs", ChangeKind::Create),
                ("module.db.aws_db_instance.main", ChangeKind::Destroy),
            ]
        );
        assert_eq!(
            plan.summary(),
            "1 to add, 0 to change, 1 to destroy, 1 unknown"
        );
    }

    #[test]
    fn unknown_alone_is_not_clean() {
        let plan = PlanResult::new().with_change("x.y", ChangeKind::Unknown);
        assert!(!plan.is_clean());
    }
}
