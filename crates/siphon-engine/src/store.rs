//! Artifact stores and the expired-file sweep.

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::Serialize;
use siphon_types::UploadError;
use walkdir::WalkDir;

/// Persists finished artifacts and returns their download URL.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist `local_file` under `folder` (e.g. `download/20250101`).
    ///
    /// The local file is left in place; the caller owns its cleanup.
    async fn put(&self, local_file: &Path, folder: &str) -> Result<String, UploadError>;
}

/// Filesystem store served by a static file endpoint.
#[derive(Debug, Clone)]
pub struct LocalStore {
    base_path: PathBuf,
    server_domain: String,
    access_prefix: String,
}

impl LocalStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        server_domain: &str,
        access_prefix: &str,
    ) -> Self {
        let server_domain = server_domain.trim_end_matches('/').to_string();
        let trimmed = access_prefix.trim_end_matches('/');
        let access_prefix = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Self {
            base_path: base_path.into(),
            server_domain,
            access_prefix,
        }
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// `{domain}{prefix}/{folder}/{file}`.
    #[must_use]
    pub fn url_for(&self, folder: &str, file_name: &str) -> String {
        let folder = folder.trim_matches('/');
        format!(
            "{}{}/{}/{}",
            self.server_domain, self.access_prefix, folder, file_name
        )
    }

    /// Location of `file_name` under `folder`, rejecting paths that would
    /// leave the store root.
    pub fn path_for(&self, folder: &str, file_name: &str) -> Result<PathBuf, UploadError> {
        let relative = Path::new(folder.trim_matches('/')).join(file_name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || file_name.is_empty() {
            return Err(UploadError::new(
                file_name,
                format!("refusing path outside the store: {}", relative.display()),
            ));
        }
        Ok(self.base_path.join(relative))
    }

    /// Delete a stored artifact. Returns whether a file was removed.
    pub async fn delete(&self, folder: &str, file_name: &str) -> Result<bool, UploadError> {
        let path = self.path_for(folder, file_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(UploadError::new(file_name, e.to_string())),
        }
    }

    /// Delete regular files under the store root last modified more than
    /// `retention_days` ago. Per-file failures are logged and counted.
    #[must_use]
    pub fn sweep_expired(&self, retention_days: u32) -> SweepReport {
        let max_age = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        sweep_older_than(&self.base_path, cutoff)
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn put(&self, local_file: &Path, folder: &str) -> Result<String, UploadError> {
        let file_name = local_file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                UploadError::new(local_file.display().to_string(), "artifact has no file name")
            })?
            .to_string();
        let target = self.path_for(folder, &file_name)?;
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| UploadError::new(&file_name, format!("create {}: {e}", dir.display())))?;
        }
        let bytes = tokio::fs::copy(local_file, &target)
            .await
            .map_err(|e| UploadError::new(&file_name, e.to_string()))?;
        let url = self.url_for(folder, &file_name);
        tracing::info!(file = %file_name, bytes, url = %url, "Stored artifact");
        Ok(url)
    }
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: u64,
    pub deleted: u64,
    pub failed: u64,
    pub bytes_freed: u64,
}

/// Delete regular files under `root` modified before `cutoff`.
#[must_use]
pub fn sweep_older_than(root: &Path, cutoff: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();
    if !root.exists() {
        tracing::warn!(root = %root.display(), "Store root does not exist, nothing to sweep");
        return report;
    }
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot read store entry");
                report.failed += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        report.scanned += 1;
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Cannot stat file");
                report.failed += 1;
                continue;
            }
        };
        let expired = meta.modified().map(|m| m < cutoff).unwrap_or(false);
        if !expired {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                report.deleted += 1;
                report.bytes_freed += meta.len();
                tracing::debug!(path = %entry.path().display(), "Deleted expired file");
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(path = %entry.path().display(), error = %e, "Failed to delete expired file");
            }
        }
    }
    tracing::info!(
        root = %root.display(),
        scanned = report.scanned,
        deleted = report.deleted,
        failed = report.failed,
        "Sweep finished"
    );
    report
}
