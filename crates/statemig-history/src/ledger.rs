//! History ledger contract and implementations
//!
//! - [`FileLedger`]: JSON-lines file, one record per line, appended and
//!   fsynced; malformed lines are skipped with a warning
//! - [`MemoryLedger`]: process-local, for tests and dry runs

use crate::error::HistoryError;
use crate::record::HistoryRecord;
use parking_lot::Mutex;
use statemig_state::ContentHash;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Append-only record of committed documents
#[async_trait::async_trait]
pub trait HistoryLedger: Send + Sync {
    /// All records, oldest first
    async fn records(&self) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Append one record
    async fn record(&self, record: HistoryRecord) -> Result<(), HistoryError>;

    /// Whether this exact document version was committed before
    async fn has_applied(&self, name: &str, digest: &ContentHash) -> Result<bool, HistoryError> {
        Ok(self
            .records()
            .await?
            .iter()
            .any(|r| r.matches(name, digest)))
    }
}

/// JSON-lines ledger on local disk
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    append: tokio::sync::Mutex<()>,
}

impl FileLedger {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append: tokio::sync::Mutex::new(()),
        }
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl HistoryLedger for FileLedger {
    async fn records(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HistoryError::io_error(&self.path, e)),
        };

        let mut records = Vec::new();
        for (n, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    "ignoring malformed history line {} in {}: {e}",
                    n + 1,
                    self.path.display()
                ),
            }
        }
        Ok(records)
    }

    async fn record(&self, record: HistoryRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.append.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HistoryError::io_error(parent, e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| HistoryError::io_error(&self.path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| HistoryError::io_error(&self.path, e))?;
        file.sync_all()
            .await
            .map_err(|e| HistoryError::io_error(&self.path, e))?;

        tracing::info!(
            document = %record.document_name,
            digest = %record.content_digest.short(),
            "history recorded"
        );
        Ok(())
    }
}

/// In-memory ledger; clones share records
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    records: Arc<Mutex<Vec<HistoryRecord>>>,
}

impl MemoryLedger {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait::async_trait]
impl HistoryLedger for MemoryLedger {
    async fn records(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        Ok(self.records.lock().clone())
    }

    async fn record(&self, record: HistoryRecord) -> Result<(), HistoryError> {
        self.records.lock().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use statemig_state::DeploymentId;

    fn record(name: &str, body: &[u8]) -> HistoryRecord {
        HistoryRecord::new(name, ContentHash::compute(body), DeploymentId::new("app"))
    }

    #[tokio::test]
    async fn memory_ledger_tracks_name_and_digest() {
        let ledger = MemoryLedger::new();
        ledger.record(record("split-db", b"v1")).await.unwrap();

        assert!(ledger
            .has_applied("split-db", &ContentHash::compute(b"v1"))
            .await
            .unwrap());
        assert!(!ledger
            .has_applied("split-db", &ContentHash::compute(b"v2"))
            .await
            .unwrap());
        assert!(!ledger
            .has_applied("other", &ContentHash::compute(b"v1"))
            .await
            .unwrap());
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn file_ledger_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(dir.path().join("history.jsonl"));
        assert!(ledger.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_ledger_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.jsonl");
        let ledger = FileLedger::new(&path);

        ledger.record(record("a", b"1")).await.unwrap();
        ledger
            .record(record("b", b"2").with_forced(true))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        let records = ledger.records().await.unwrap();
        assert_eq!(records[0].document_name, "a");
        assert!(records[1].forced);

        let reopened = FileLedger::new(&path).records().await.unwrap();
        assert_eq!(reopened, records);
    }

    #[tokio::test]
    async fn file_ledger_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let good = serde_json::to_string(&record("a", b"1")).unwrap();
        std::fs::write(&path, format!("{good}\nnot json\n\n{{\"document_name\": 3}}\n")).unwrap();

        let ledger = FileLedger::new(&path);
        let records = ledger.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(ledger
            .has_applied("a", &ContentHash::compute(b"1"))
            .await
            .unwrap());
    }
}
