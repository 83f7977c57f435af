//! Local filesystem backend
//!
//! Mirrors the IaC engine's local backend layout under a root directory:
//!
//! ```text
//! <root>/<dir>/terraform.tfstate                               (default workspace)
//! <root>/<dir>/terraform.tfstate.d/<workspace>/terraform.tfstate
//! ```
//!
//! The lock is a `.terraform.tfstate.lock.info` file next to the state,
//! created exclusively and holding [`LockInfo`] as JSON. A lock older than
//! the lease is treated as abandoned and evicted.

use crate::backend::{LockHandle, LockInfo, StateBackend};
use crate::error::StateError;
use crate::snapshot::{DeploymentId, StateSnapshot};
use crate::tfstate;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const STATE_FILE: &str = "terraform.tfstate";
const WORKSPACE_DIR: &str = "terraform.tfstate.d";
const LOCK_FILE: &str = ".terraform.tfstate.lock.info";

/// Default lock lease
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(15 * 60);

/// State files on local disk
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    lease: Duration,
}

impl LocalBackend {
    /// Backend rooted at `root`
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lease: DEFAULT_LOCK_LEASE,
        }
    }

    /// With a custom lock lease
    #[inline]
    #[must_use]
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Path of a deployment's state file
    #[must_use]
    pub fn state_path(&self, deployment: &DeploymentId) -> PathBuf {
        let dir = self.root.join(deployment.dir());
        if deployment.is_default_workspace() {
            dir.join(STATE_FILE)
        } else {
            dir.join(WORKSPACE_DIR)
                .join(deployment.workspace())
                .join(STATE_FILE)
        }
    }

    /// Path of a deployment's lock file
    #[must_use]
    pub fn lock_path(&self, deployment: &DeploymentId) -> PathBuf {
        let state = self.state_path(deployment);
        state
            .parent()
            .map_or_else(|| PathBuf::from(LOCK_FILE), |p| p.join(LOCK_FILE))
    }

    async fn read_optional(&self, path: &Path) -> Result<Option<StateSnapshot>, StateError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => tfstate::decode(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::io_error(path, e)),
        }
    }

    async fn read_lock_info(path: &Path) -> Option<LockInfo> {
        let bytes = tokio::fs::read(path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    async fn try_create_lock(&self, path: &Path, info: &LockInfo) -> Result<bool, StateError> {
        let body = serde_json::to_vec(info)?;
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await;
        let mut file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(StateError::io_error(path, e)),
        };
        let written = async {
            file.write_all(&body).await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        match written {
            Ok(()) => Ok(true),
            Err(e) => Err(abandon_lock_file(path, e).await),
        }
    }

    fn is_expired(&self, info: &LockInfo) -> bool {
        let age = Utc::now().signed_duration_since(info.created);
        age.to_std().is_ok_and(|age| age > self.lease)
    }
}

/// Remove a lock file whose body could not be written
async fn abandon_lock_file(path: &Path, cause: std::io::Error) -> StateError {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::error!(path = %path.display(), "failed to remove partial lock file: {e}");
    }
    StateError::io_error(path, cause)
}

/// Whether the lock file at `path` may be removed by the holder of `info`
///
/// `contents` is the file body, `None` if the file is gone.
fn owns_lock_file(path: &Path, info: &LockInfo, contents: Option<&[u8]>) -> bool {
    let Some(bytes) = contents else {
        tracing::warn!(path = %path.display(), "lock file vanished before release");
        return false;
    };
    match serde_json::from_slice::<LockInfo>(bytes) {
        Ok(current) if current.id != info.id => {
            tracing::warn!(
                path = %path.display(),
                holder = %current,
                "lock was taken over after lease expiry; leaving it in place"
            );
            false
        }
        _ => true,
    }
}

fn not_found_as_none(
    path: &Path,
    read: std::io::Result<Vec<u8>>,
) -> Result<Option<Vec<u8>>, StateError> {
    match read {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StateError::io_error(path, e)),
    }
}

/// Remove the lock file if it still belongs to `info`; blocking, for drops
fn release_lock_file(path: &Path, info: &LockInfo) -> Result<(), StateError> {
    let contents = not_found_as_none(path, std::fs::read(path))?;
    if owns_lock_file(path, info, contents.as_deref()) {
        std::fs::remove_file(path).map_err(|e| StateError::io_error(path, e))?;
    }
    Ok(())
}

async fn release_lock_file_async(path: &Path, info: &LockInfo) -> Result<(), StateError> {
    let contents = not_found_as_none(path, tokio::fs::read(path).await)?;
    if owns_lock_file(path, info, contents.as_deref()) {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| StateError::io_error(path, e))?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl StateBackend for LocalBackend {
    async fn acquire_lock(&self, deployment: &DeploymentId) -> Result<LockHandle, StateError> {
        deployment.validate()?;
        let path = self.lock_path(deployment);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StateError::io_error(parent, e))?;
        }

        let info = LockInfo::for_current_process(deployment.clone());
        let mut created = self.try_create_lock(&path, &info).await?;

        if !created {
            match Self::read_lock_info(&path).await {
                Some(existing) if self.is_expired(&existing) => {
                    tracing::warn!(
                        deployment = %deployment,
                        holder = %existing,
                        "evicting expired lock"
                    );
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(StateError::io_error(&path, e)),
                    }
                    created = self.try_create_lock(&path, &info).await?;
                }
                Some(existing) => {
                    return Err(StateError::LockHeld {
                        deployment: deployment.clone(),
                        holder: existing.to_string(),
                    });
                }
                None => {
                    return Err(StateError::LockHeld {
                        deployment: deployment.clone(),
                        holder: format!("unreadable lock file {}", path.display()),
                    });
                }
            }
        }

        if !created {
            return Err(StateError::LockHeld {
                deployment: deployment.clone(),
                holder: "a concurrent run".to_string(),
            });
        }

        tracing::debug!(deployment = %deployment, lock = %info.id, "lock acquired");
        let release_info = info.clone();
        Ok(LockHandle::new(info, move || {
            release_lock_file(&path, &release_info)
        }))
    }

    async fn read(&self, deployment: &DeploymentId) -> Result<StateSnapshot, StateError> {
        deployment.validate()?;
        let path = self.state_path(deployment);
        Ok(self
            .read_optional(&path)
            .await?
            .unwrap_or_else(StateSnapshot::empty))
    }

    async fn write(
        &self,
        deployment: &DeploymentId,
        snapshot: &StateSnapshot,
        expected_serial: u64,
    ) -> Result<u64, StateError> {
        deployment.validate()?;
        let path = self.state_path(deployment);
        let current = self.read_optional(&path).await?;

        let actual = current.as_ref().map_or(0, StateSnapshot::serial);
        if actual != expected_serial {
            return Err(StateError::StaleState {
                deployment: deployment.clone(),
                expected: expected_serial,
                actual,
            });
        }
        if let Some(current) = &current {
            if current.lineage() != snapshot.lineage() {
                return Err(StateError::LineageMismatch {
                    deployment: deployment.clone(),
                    stored: current.lineage().to_string(),
                    writing: snapshot.lineage().to_string(),
                });
            }
        }

        let serial = expected_serial + 1;
        let bytes = tfstate::encode(&snapshot.clone().with_serial(serial))?;

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StateError::io_error(parent, e))?;

        if current.is_some() {
            let backup = path.with_extension("tfstate.backup");
            tokio::fs::copy(&path, &backup)
                .await
                .map_err(|e| StateError::io_error(&backup, e))?;
        }

        let tmp = parent.join(format!(".{STATE_FILE}.{}.tmp", uuid::Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| StateError::io_error(&tmp, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| StateError::io_error(&tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| StateError::io_error(&tmp, e))?;
        drop(file);
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StateError::io_error(&path, e))?;

        tracing::info!(deployment = %deployment, serial, "state written");
        Ok(serial)
    }

    async fn release_lock(&self, handle: LockHandle) -> Result<(), StateError> {
        let info = handle.disarm();
        let path = self.lock_path(&info.deployment);
        release_lock_file_async(&path, &info).await?;
        tracing::debug!(deployment = %info.deployment, lock = %info.id, "lock released");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ResourceRecord;

    fn seeded() -> StateSnapshot {
        StateSnapshot::with_lineage("lineage-1").with_resource(
            "aws_instance.web".parse().unwrap(),
            ResourceRecord::imported("provider[\"registry.terraform.io/hashicorp/aws\"]", "i-1"),
        )
    }

    #[test]
    fn workspace_layout() {
        let backend = LocalBackend::new("/srv/state");
        let prod = DeploymentId::new("envs/prod");
        assert_eq!(
            backend.state_path(&prod),
            PathBuf::from("/srv/state/envs/prod/terraform.tfstate")
        );
        assert_eq!(
            backend.state_path(&prod.clone().with_workspace("blue")),
            PathBuf::from("/srv/state/envs/prod/terraform.tfstate.d/blue/terraform.tfstate")
        );
        assert_eq!(
            backend.lock_path(&prod),
            PathBuf::from("/srv/state/envs/prod/.terraform.tfstate.lock.info")
        );
    }

    #[tokio::test]
    async fn missing_state_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let state = backend.read(&DeploymentId::new("app")).await.unwrap();
        assert_eq!(state.serial(), 0);
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn write_increments_serial_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let dep = DeploymentId::new("app");

        assert_eq!(backend.write(&dep, &seeded(), 0).await.unwrap(), 1);
        let stored = backend.read(&dep).await.unwrap();
        assert_eq!(stored.serial(), 1);
        assert!(stored.same_resources(&seeded()));

        assert_eq!(backend.write(&dep, &stored, 1).await.unwrap(), 2);
        assert!(backend
            .state_path(&dep)
            .with_extension("tfstate.backup")
            .exists());
    }

    #[tokio::test]
    async fn stale_serial_is_rejected_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let dep = DeploymentId::new("app");
        backend.write(&dep, &seeded(), 0).await.unwrap();

        let err = backend
            .write(&dep, &StateSnapshot::with_lineage("lineage-1"), 0)
            .await
            .unwrap_err();
        assert!(err.is_stale());
        assert_eq!(backend.read(&dep).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn foreign_lineage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let dep = DeploymentId::new("app");
        backend.write(&dep, &seeded(), 0).await.unwrap();

        let err = backend
            .write(&dep, &StateSnapshot::with_lineage("other"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::LineageMismatch { .. }));
    }

    #[tokio::test]
    async fn second_lock_fails_fast_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let dep = DeploymentId::new("app");

        let handle = backend.acquire_lock(&dep).await.unwrap();
        assert!(backend.lock_path(&dep).exists());
        assert!(backend.acquire_lock(&dep).await.unwrap_err().is_lock_held());

        backend.release_lock(handle).await.unwrap();
        assert!(!backend.lock_path(&dep).exists());
        let again = backend.acquire_lock(&dep).await.unwrap();
        drop(again);
        assert!(!backend.lock_path(&dep).exists());
    }

    #[tokio::test]
    async fn deployments_outside_the_root_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("state");
        let backend = LocalBackend::new(&root);

        for deployment in [
            DeploymentId::new("../escape"),
            DeploymentId::new("/tmp/escape"),
            DeploymentId::new("app").with_workspace("../../escape"),
        ] {
            let err = backend.acquire_lock(&deployment).await.unwrap_err();
            assert!(matches!(err, StateError::InvalidDeployment { .. }), "{deployment}");
            assert!(backend.read(&deployment).await.is_err());
            assert!(backend.write(&deployment, &seeded(), 0).await.is_err());
        }
        assert!(!dir.path().join("escape").exists());
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn partial_lock_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE);
        std::fs::write(&path, b"{").unwrap();

        let err = abandon_lock_file(&path, std::io::Error::other("disk full")).await;
        assert!(matches!(err, StateError::Io { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn release_leaves_a_taken_over_lock() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let dep = DeploymentId::new("app");

        let handle = backend.acquire_lock(&dep).await.unwrap();
        let successor = LockInfo::for_current_process(dep.clone());
        std::fs::write(backend.lock_path(&dep), serde_json::to_vec(&successor).unwrap()).unwrap();

        backend.release_lock(handle).await.unwrap();
        let stored: LockInfo =
            serde_json::from_slice(&std::fs::read(backend.lock_path(&dep)).unwrap()).unwrap();
        assert_eq!(stored.id, successor.id);
    }

    #[tokio::test]
    async fn expired_lock_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path()).with_lease(Duration::from_secs(60));
        let dep = DeploymentId::new("app");

        let mut abandoned = LockInfo::for_current_process(dep.clone());
        abandoned.created = Utc::now() - chrono::Duration::hours(2);
        let lock_path = backend.lock_path(&dep);
        std::fs::create_dir_all(lock_path.parent().unwrap()).unwrap();
        std::fs::write(&lock_path, serde_json::to_vec(&abandoned).unwrap()).unwrap();

        let handle = backend.acquire_lock(&dep).await.unwrap();
        assert_ne!(handle.info().id, abandoned.id);
    }
}
