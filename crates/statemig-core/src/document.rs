//! Migration documents
//!
//! A document names a deployment and lists the actions to replay against
//! its state, in order:
//!
//! ```toml
//! name = "split-db"
//! dir = "envs/prod"
//! actions = [
//!   "mv module.db module.db_primary",
//!   "import aws_s3_bucket.logs my-log-bucket",
//! ]
//! ```
//!
//! TOML, YAML and JSON are accepted, chosen by file extension. The
//! document's digest is the Blake3 hash of its raw bytes.

use crate::error::ParseError;
use serde::Deserialize;
use statemig_action::Action;
use statemig_state::{ContentHash, DeploymentId, DEFAULT_WORKSPACE};
use std::path::{Path, PathBuf};

/// Serialization format of a document file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Toml,
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Format implied by a file extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Toml => "toml",
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_dir")]
    dir: String,
    #[serde(default)]
    workspace: Option<String>,
    #[serde(default)]
    force: bool,
    actions: Vec<String>,
}

fn default_dir() -> String {
    ".".to_string()
}

/// Parsed, immutable migration document
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationDocument {
    name: String,
    deployment: DeploymentId,
    actions: Vec<Action>,
    force: bool,
    digest: ContentHash,
    source_path: Option<PathBuf>,
}

impl MigrationDocument {
    /// Build a document in code
    ///
    /// The digest covers the name, deployment and the text form of each
    /// action.
    ///
    /// # Errors
    /// Returns [`ParseError::EmptyActions`] or [`ParseError::InvalidName`]
    pub fn new(
        name: impl Into<String>,
        deployment: DeploymentId,
        actions: Vec<Action>,
    ) -> Result<Self, ParseError> {
        let name = validate_name(name.into())?;
        if actions.is_empty() {
            return Err(ParseError::EmptyActions(name));
        }
        let mut canonical = format!("{name}\n{deployment}\n");
        for action in &actions {
            canonical.push_str(&action.to_string());
            canonical.push('\n');
        }
        Ok(Self {
            digest: ContentHash::compute(canonical.as_bytes()),
            name,
            deployment,
            actions,
            force: false,
            source_path: None,
        })
    }

    /// Commit even when the plan is not clean
    #[inline]
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Parse document source
    ///
    /// `fallback_name` is used when the document has no `name` key.
    ///
    /// # Errors
    /// Returns [`ParseError`] for syntax errors, unknown keys, an empty or
    /// malformed action list, or a missing name
    pub fn parse(
        source: &str,
        format: DocumentFormat,
        fallback_name: Option<&str>,
    ) -> Result<Self, ParseError> {
        let syntax = |message: String| ParseError::Syntax {
            format: format.as_str(),
            message,
        };
        let raw: RawDocument = match format {
            DocumentFormat::Toml => toml::from_str(source).map_err(|e| syntax(e.to_string()))?,
            DocumentFormat::Yaml => {
                serde_yaml::from_str(source).map_err(|e| syntax(e.to_string()))?
            }
            DocumentFormat::Json => {
                serde_json::from_str(source).map_err(|e| syntax(e.to_string()))?
            }
        };

        let name = raw
            .name
            .or_else(|| fallback_name.map(str::to_string))
            .ok_or(ParseError::MissingName)?;
        let name = validate_name(name)?;
        if raw.actions.is_empty() {
            return Err(ParseError::EmptyActions(name));
        }

        let actions =
            Action::parse_all(&raw.actions).map_err(|(index, source)| ParseError::InvalidAction {
                index,
                line: raw.actions[index].clone(),
                source,
            })?;

        let deployment = DeploymentId::new(raw.dir)
            .with_workspace(raw.workspace.unwrap_or_else(|| DEFAULT_WORKSPACE.to_string()));

        let document = Self {
            name,
            deployment,
            actions,
            force: raw.force,
            digest: ContentHash::compute(source.as_bytes()),
            source_path: None,
        };
        tracing::debug!(
            document = %document.name,
            deployment = %document.deployment,
            actions = document.actions.len(),
            force = document.force,
            digest = %document.digest.short(),
            "document parsed"
        );
        Ok(document)
    }

    /// Read and parse a document file
    ///
    /// # Errors
    /// Returns [`ParseError`] if the file cannot be read or parsed
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let format = DocumentFormat::from_path(path)
            .ok_or_else(|| ParseError::UnsupportedFormat(path.to_path_buf()))?;
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ParseError::io_error(path, e))?;
        let stem = path.file_stem().and_then(|s| s.to_str());
        let mut document = Self::parse(&source, format, stem)?;
        document.source_path = Some(path.to_path_buf());
        Ok(document)
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn deployment(&self) -> &DeploymentId {
        &self.deployment
    }

    /// Actions in application order
    #[inline]
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    #[inline]
    #[must_use]
    pub fn force(&self) -> bool {
        self.force
    }

    /// Blake3 hash of the source bytes
    #[inline]
    #[must_use]
    pub fn digest(&self) -> &ContentHash {
        &self.digest
    }

    #[inline]
    #[must_use]
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }
}

fn validate_name(name: String) -> Result<String, ParseError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_control) {
        return Err(ParseError::InvalidName(name));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SPLIT_DB: &str = r#"
name = "split-db"
dir = "envs/prod"
actions = [
  "mv module.db module.db_primary",
  "import aws_s3_bucket.logs my-log-bucket",
  "rm aws_instance.legacy aws_instance.legacy_2",
]
"#;

    #[test]
    fn parses_toml_document() {
        let doc = MigrationDocument::parse(SPLIT_DB, DocumentFormat::Toml, None).unwrap();
        assert_eq!(doc.name(), "split-db");
        assert_eq!(doc.deployment(), &DeploymentId::new("envs/prod"));
        assert!(!doc.force());
        assert_eq!(doc.actions().len(), 4);
        assert_eq!(doc.actions()[0].verb(), "mv");
        assert_eq!(doc.digest(), &ContentHash::compute(SPLIT_DB.as_bytes()));
    }

    #[test]
    fn parses_yaml_and_json() {
        let yaml = "workspace: staging\nforce: true\nactions:\n  - forget aws_instance.gone\n";
        let doc = MigrationDocument::parse(yaml, DocumentFormat::Yaml, Some("cleanup")).unwrap();
        assert_eq!(doc.name(), "cleanup");
        assert_eq!(doc.deployment().dir(), ".");
        assert_eq!(doc.deployment().workspace(), "staging");
        assert!(doc.force());

        let json = r#"{"name": "j", "actions": ["import aws_s3_bucket.b bucket-b"]}"#;
        let doc = MigrationDocument::parse(json, DocumentFormat::Json, None).unwrap();
        assert_eq!(doc.name(), "j");
    }

    #[test]
    fn digest_changes_with_content() {
        let a = MigrationDocument::parse(SPLIT_DB, DocumentFormat::Toml, None).unwrap();
        let edited = SPLIT_DB.replace("my-log-bucket", "other-bucket");
        let b = MigrationDocument::parse(&edited, DocumentFormat::Toml, None).unwrap();
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn rejects_bad_documents() {
        let empty = "name = \"x\"\nactions = []\n";
        assert!(matches!(
            MigrationDocument::parse(empty, DocumentFormat::Toml, None),
            Err(ParseError::EmptyActions(_))
        ));

        let unknown = "name = \"x\"\nactions = [\"rm a.b\"]\nretries = 3\n";
        assert!(matches!(
            MigrationDocument::parse(unknown, DocumentFormat::Toml, None),
            Err(ParseError::Syntax { format: "toml", .. })
        ));

        let nameless = "actions = [\"rm a.b\"]\n";
        assert!(matches!(
            MigrationDocument::parse(nameless, DocumentFormat::Toml, None),
            Err(ParseError::MissingName)
        ));

        let bad_action = "name = \"x\"\nactions = [\"rm a.b\", \"teleport a.b\"]\n";
        match MigrationDocument::parse(bad_action, DocumentFormat::Toml, None) {
            Err(ParseError::InvalidAction { index, line, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(line, "teleport a.b");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let blank_name = "name = \"  \"\nactions = [\"rm a.b\"]\n";
        assert!(matches!(
            MigrationDocument::parse(blank_name, DocumentFormat::Toml, None),
            Err(ParseError::InvalidName(_))
        ));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("m/001_split.toml")),
            Some(DocumentFormat::Toml)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.YML")),
            Some(DocumentFormat::Yaml)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("README.md")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("noext")), None);
    }

    #[tokio::test]
    async fn load_takes_name_from_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("002_cleanup.yaml");
        std::fs::write(&path, "actions: [\"rm aws_instance.old\"]\n").unwrap();

        let doc = MigrationDocument::load(&path).await.unwrap();
        assert_eq!(doc.name(), "002_cleanup");
        assert_eq!(doc.source_path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn load_rejects_unknown_extension() {
        let err = MigrationDocument::load("notes.txt").await.unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(_)));
    }

    #[test]
    fn documents_built_in_code_need_actions() {
        let err = MigrationDocument::new("x", DeploymentId::new("."), Vec::new()).unwrap_err();
        assert!(matches!(err, ParseError::EmptyActions(_)));
    }
}
