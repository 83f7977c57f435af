//! History records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statemig_state::{ContentHash, DeploymentId};

/// One committed migration document
///
/// The `(document_name, content_digest)` pair is the idempotency key:
/// editing a document after it was applied produces a new digest and makes
/// it eligible again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub document_name: String,
    pub content_digest: ContentHash,
    pub applied_at: DateTime<Utc>,
    pub deployment: DeploymentId,
    /// Committed despite a divergent plan
    #[serde(default)]
    pub forced: bool,
}

impl HistoryRecord {
    /// Record stamped with the current time
    #[must_use]
    pub fn new(
        document_name: impl Into<String>,
        content_digest: ContentHash,
        deployment: DeploymentId,
    ) -> Self {
        Self {
            document_name: document_name.into(),
            content_digest,
            applied_at: Utc::now(),
            deployment,
            forced: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_forced(mut self, forced: bool) -> Self {
        self.forced = forced;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_applied_at(mut self, applied_at: DateTime<Utc>) -> Self {
        self.applied_at = applied_at;
        self
    }

    /// Whether this record covers the given document version
    #[inline]
    #[must_use]
    pub fn matches(&self, name: &str, digest: &ContentHash) -> bool {
        self.document_name == name && self.content_digest == *digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn split_db() -> HistoryRecord {
        HistoryRecord::new(
            "split-db",
            ContentHash::compute(b"mv module.db module.db_primary"),
            DeploymentId::new("envs/prod"),
        )
    }

    #[test]
    fn matches_name_and_digest_together() {
        let record = split_db();
        let digest = ContentHash::compute(b"mv module.db module.db_primary");
        assert!(record.matches("split-db", &digest));
        assert!(!record.matches("split-db", &ContentHash::compute(b"edited")));
        assert!(!record.matches("other", &digest));
    }

    #[test]
    fn forced_defaults_to_false_when_absent() {
        let applied_at = "2026-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let record = split_db().with_applied_at(applied_at);

        let mut json = serde_json::to_value(&record).unwrap();
        json.as_object_mut().unwrap().remove("forced");
        let decoded: HistoryRecord = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, record);

        let forced = record.with_forced(true);
        let line = serde_json::to_string(&forced).unwrap();
        assert_eq!(serde_json::from_str::<HistoryRecord>(&line).unwrap(), forced);
    }
}
