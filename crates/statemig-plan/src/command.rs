//! Subprocess diff oracle
//!
//! Drives an external IaC executable:
//!
//! 1. the candidate state is written as tfstate JSON to a temp file
//! 2. the program runs with its configured args plus the state path as the
//!    last argument (also exported as `STATEMIG_STATE_PATH`)
//! 3. exit status 0 or 2 means a diff was produced and stdout holds plan
//!    JSON; any other status is an oracle failure
//!
//! A wrapper script is expected to do the `plan -state=... -out=...` and
//! `show -json` dance and print the result.

use crate::error::OracleError;
use crate::oracle::DiffOracle;
use crate::result::{ChangeKind, PlanResult};
use serde::Deserialize;
use statemig_state::{tfstate, StateSnapshot};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Environment variable carrying the candidate state path
pub const STATE_PATH_ENV: &str = "STATEMIG_STATE_PATH";

/// Longest stderr excerpt kept in an error
const MAX_STDERR_BYTES: usize = 4 * 1024;

/// Diff oracle backed by an external program
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl CommandOracle {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// With arguments placed before the state path
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// With extra environment variables
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Run the program in `dir`
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn run(&self, state_path: &Path) -> Result<std::process::Output, OracleError> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .arg(state_path)
            .env(STATE_PATH_ENV, state_path)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(program = %self.program.display(), args = ?self.args, "running diff oracle");
        command.output().await.map_err(|source| OracleError::Spawn {
            program: self.program.clone(),
            source,
        })
    }
}

#[async_trait::async_trait]
impl DiffOracle for CommandOracle {
    async fn diff(&self, state: &StateSnapshot) -> Result<PlanResult, OracleError> {
        let bytes = tfstate::encode(state)?;
        let file = tempfile::Builder::new()
            .prefix("statemig-")
            .suffix(".tfstate")
            .tempfile()
            .map_err(|e| OracleError::io_error(std::env::temp_dir(), e))?;
        tokio::fs::write(file.path(), &bytes)
            .await
            .map_err(|e| OracleError::io_error(file.path(), e))?;

        let output = self.run(file.path()).await?;
        match output.status.code() {
            Some(0 | 2) => parse_plan_json(&output.stdout),
            code => Err(OracleError::NonZeroExit {
                code,
                stderr: stderr_excerpt(&output.stderr),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= MAX_STDERR_BYTES {
        return text.to_string();
    }
    let mut end = MAX_STDERR_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[derive(Deserialize)]
struct PlanJson {
    #[serde(default)]
    resource_changes: Vec<ResourceChange>,
}

#[derive(Deserialize)]
struct ResourceChange {
    address: String,
    change: Change,
}

#[derive(Deserialize)]
struct Change {
    actions: Vec<String>,
}

/// Classify Terraform plan JSON (`show -json` output)
///
/// # Errors
/// Returns [`OracleError::MalformedOutput`] if the bytes are not plan JSON
pub fn parse_plan_json(bytes: &[u8]) -> Result<PlanResult, OracleError> {
    let plan: PlanJson =
        serde_json::from_slice(bytes).map_err(|e| OracleError::MalformedOutput(e.to_string()))?;
    Ok(plan
        .resource_changes
        .into_iter()
        .map(|rc| {
            let kind = ChangeKind::from_plan_actions(rc.change.actions.as_slice());
            (rc.address, kind)
        })
        .collect())
}
