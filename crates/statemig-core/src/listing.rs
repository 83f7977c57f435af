//! Migration directory listing

use crate::document::{DocumentFormat, MigrationDocument};
use crate::error::{MigrateError, ParseError};
use statemig_history::HistoryLedger;
use statemig_state::ContentHash;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Whether a document version is in history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    Applied,
    Unapplied,
}

impl Display for DocumentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Applied => "applied",
            Self::Unapplied => "unapplied",
        })
    }
}

/// Which entries `list` shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Applied,
    Unapplied,
}

impl StatusFilter {
    #[must_use]
    pub fn matches(self, status: DocumentStatus) -> bool {
        match self {
            Self::All => true,
            Self::Applied => status == DocumentStatus::Applied,
            Self::Unapplied => status == DocumentStatus::Unapplied,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "applied" => Ok(Self::Applied),
            "unapplied" => Ok(Self::Unapplied),
            other => Err(format!("unknown status `{other}` (expected all, applied or unapplied)")),
        }
    }
}

/// One document file in a migration directory
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    pub path: PathBuf,
    pub name: String,
    pub digest: ContentHash,
    pub status: DocumentStatus,
    pub document: MigrationDocument,
}

impl Display for DocumentEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<10} {} ({})",
            self.status,
            self.name,
            self.path.display()
        )
    }
}

/// Parse every document in `dir` and look up its history status
///
/// Files are taken in file-name order; files with other extensions are
/// ignored.
///
/// # Errors
/// Returns the first read, parse or ledger error
pub async fn list_documents(
    dir: &Path,
    ledger: &dyn HistoryLedger,
) -> Result<Vec<DocumentEntry>, MigrateError> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ParseError::io_error(dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ParseError::io_error(dir, e))?
    {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map_err(|e| ParseError::io_error(&path, e))?
            .is_file();
        if is_file && DocumentFormat::from_path(&path).is_some() {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let records = ledger.records().await?;
    let mut listed = Vec::with_capacity(paths.len());
    for path in paths {
        let document = MigrationDocument::load(&path).await?;
        let applied = records
            .iter()
            .any(|r| r.matches(document.name(), document.digest()));
        listed.push(DocumentEntry {
            name: document.name().to_string(),
            digest: *document.digest(),
            status: if applied {
                DocumentStatus::Applied
            } else {
                DocumentStatus::Unapplied
            },
            path,
            document,
        });
    }
    tracing::debug!(dir = %dir.display(), documents = listed.len(), "migration directory listed");
    Ok(listed)
}

/// Unapplied documents in `dir`, in file-name order
///
/// # Errors
/// Same as [`list_documents`]
pub async fn pending_documents(
    dir: &Path,
    ledger: &dyn HistoryLedger,
) -> Result<Vec<MigrationDocument>, MigrateError> {
    Ok(list_documents(dir, ledger)
        .await?
        .into_iter()
        .filter(|e| e.status == DocumentStatus::Unapplied)
        .map(|e| e.document)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use statemig_history::{HistoryRecord, MemoryLedger};

    #[test]
    fn filter_parses_and_matches() {
        assert_eq!("unapplied".parse::<StatusFilter>(), Ok(StatusFilter::Unapplied));
        assert!("done".parse::<StatusFilter>().is_err());
        assert!(StatusFilter::All.matches(DocumentStatus::Applied));
        assert!(!StatusFilter::Applied.matches(DocumentStatus::Unapplied));
    }

    #[tokio::test]
    async fn lists_in_file_name_order_with_status() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("002_b.toml"), "actions = [\"rm aws_instance.b\"]\n").unwrap();
        std::fs::write(dir.path().join("001_a.yaml"), "actions: [\"rm aws_instance.a\"]\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "# notes\n").unwrap();
        std::fs::create_dir(dir.path().join("archive.toml")).unwrap();

        let ledger = MemoryLedger::new();
        let first = MigrationDocument::load(dir.path().join("001_a.yaml")).await.unwrap();
        ledger
            .record(HistoryRecord::new("001_a", *first.digest(), first.deployment().clone()))
            .await
            .unwrap();

        let listed = list_documents(dir.path(), &ledger).await.unwrap();
        let summary: Vec<_> = listed.iter().map(|e| (e.name.as_str(), e.status)).collect();
        assert_eq!(
            summary,
            vec![("001_a", DocumentStatus::Applied), ("002_b", DocumentStatus::Unapplied)]
        );

        let pending = pending_documents(dir.path(), &ledger).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name(), "002_b");
    }

    #[tokio::test]
    async fn parse_errors_propagate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001_bad.toml"), "actions = [\"teleport a.b\"]\n").unwrap();

        let err = list_documents(dir.path(), &MemoryLedger::new()).await.unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }
}
