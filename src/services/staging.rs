use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::services::source::{self, AssetSource};
use crate::services::storage::{R2Client, StorageError};

/// Staged files older than this are eligible for reclamation. Jobs consume
/// their staged file within minutes, so no coordination with in-flight
/// acquires is needed; reclaim relies on this window alone.
const RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Whole-request timeout for remote URL downloads.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Filename prefixes marking files owned by the staging store. Anything in
/// the staging directory not carrying one of these is foreign and never
/// touched by reclaim.
const OBJECT_PREFIX: &str = "obj-";
const URL_PREFIX: &str = "url-";

/// Materializes remote or object-stored video assets as local files for
/// channel upload, and reclaims stale files from the shared staging
/// directory. Safe for concurrent use: every acquire writes to a freshly
/// named file and leaves it in a terminal state (complete or absent).
pub struct StagingStore {
    dir: PathBuf,
    storage: Arc<R2Client>,
    http: reqwest::Client,
    retention: Duration,
}

impl StagingStore {
    pub fn new(dir: impl Into<PathBuf>, storage: Arc<R2Client>) -> Result<Self, StagingError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| StagingError::Transport(e.to_string()))?;

        Ok(Self {
            dir,
            storage,
            http,
            retention: RETENTION,
        })
    }

    /// Download the asset behind `source_path` into a uniquely named local
    /// file and return its path.
    ///
    /// On any failure after a partial write the file is removed before the
    /// error is returned, so the error path never leaves bytes behind.
    /// Cancelling the token aborts the transfer and cleans up the same way.
    pub async fn acquire(
        &self,
        source_path: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, StagingError> {
        if cancel.is_cancelled() {
            return Err(StagingError::Cancelled);
        }

        let asset = source::classify(source_path)?;
        let (prefix, target) = match &asset {
            AssetSource::ObjectKey(key) => (OBJECT_PREFIX, key),
            AssetSource::RemoteUrl(url) => (URL_PREFIX, url),
        };
        let filename = format!("{prefix}{}{}", Uuid::new_v4(), source::infer_extension(target));
        let path = self.dir.join(filename);

        let result = match &asset {
            AssetSource::ObjectKey(key) => self.fetch_object(key, &path, cancel).await,
            AssetSource::RemoteUrl(url) => self.fetch_url(url, &path, cancel).await,
        };

        if let Err(e) = result {
            remove_partial(&path);
            return Err(e);
        }

        tracing::debug!(source = %source_path, local = %path.display(), "asset staged");
        Ok(path)
    }

    async fn fetch_object(
        &self,
        key: &str,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), StagingError> {
        let mut file = tokio::fs::File::create(path).await?;

        tokio::select! {
            _ = cancel.cancelled() => return Err(StagingError::Cancelled),
            result = self.storage.download_to(key, &mut file) => {
                result.map_err(|e| match e {
                    StorageError::Status(code) => StagingError::RemoteStatus(code),
                    other => StagingError::Transport(other.to_string()),
                })?;
            }
        }

        file.flush().await?;
        Ok(())
    }

    async fn fetch_url(
        &self,
        url: &str,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), StagingError> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(StagingError::Cancelled),
            result = self.http.get(url).send() => {
                result.map_err(|e| StagingError::Transport(e.to_string()))?
            }
        };

        if !response.status().is_success() {
            return Err(StagingError::RemoteStatus(response.status().as_u16()));
        }

        let mut response = response;
        let mut file = tokio::fs::File::create(path).await?;
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(StagingError::Cancelled),
                result = response.chunk() => {
                    result.map_err(|e| StagingError::Transport(e.to_string()))?
                }
            };
            match chunk {
                Some(bytes) => file.write_all(&bytes).await?,
                None => break,
            }
        }

        file.flush().await?;
        Ok(())
    }

    /// Return a URL a channel adapter can fetch the asset from.
    ///
    /// Already-absolute http(s) URLs pass through unchanged; object keys
    /// get a signed GET URL valid for `ttl`.
    pub async fn signed_url(
        &self,
        source_path: &str,
        ttl: Duration,
    ) -> Result<String, StagingError> {
        match source::classify(source_path)? {
            AssetSource::RemoteUrl(url) => Ok(url),
            AssetSource::ObjectKey(key) => self
                .storage
                .presign_get(&key, ttl.as_secs() as u32)
                .await
                .map_err(|e| StagingError::Sign(e.to_string())),
        }
    }

    /// Delete staged files older than the retention window. Only regular
    /// files matching the store's own naming convention are candidates;
    /// directories and foreign files sharing the directory are untouched.
    /// Returns the number of files removed.
    pub fn reclaim(&self) -> Result<usize, StagingError> {
        let mut removed = 0;

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(OBJECT_PREFIX) && !name.starts_with(URL_PREFIX) {
                continue;
            }

            let modified = entry.metadata()?.modified()?;
            let expired = modified
                .elapsed()
                .map(|age| age >= self.retention)
                .unwrap_or(false);
            if !expired {
                continue;
            }

            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                // Lost a race with another sweep; nothing to do.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(file = %entry.path().display(), error = %e, "reclaim failed");
                }
            }
        }

        if removed > 0 {
            metrics::counter!("staging_files_reclaimed").increment(removed as u64);
        }
        Ok(removed)
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(file = %path.display(), error = %e, "failed to remove partial file");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("source path is empty")]
    EmptyPath,

    /// The remote end answered but with a non-success status.
    #[error("remote returned status {0}")]
    RemoteStatus(u16),

    /// The transfer itself failed (DNS, connect, timeout, broken stream).
    #[error("transfer failed: {0}")]
    Transport(String),

    #[error("staging file I/O failed: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("signing failed: {0}")]
    Sign(String),

    #[error("acquisition cancelled")]
    Cancelled,
}

impl From<crate::services::source::SourceError> for StagingError {
    fn from(_: crate::services::source::SourceError) -> Self {
        StagingError::EmptyPath
    }
}
