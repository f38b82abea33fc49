//! Interfaces of the collaborators the editor talks to, plus the concrete
//! adapters shipped with the binary.

pub mod http_resolver;
pub mod local_upload;

#[cfg(test)]
pub mod fake;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::model::{BookmarkPayload, FileRecord};

/// How a preview image relates to the page it was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Favicon / touch icon declared by the site.
    SiteIcon,
    /// Any other image (og:image and friends).
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    pub url: String,
    pub kind: ImageKind,
}

/// Metadata suggested for a link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMetadata {
    pub title: String,
    pub images: Vec<PreviewImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The URL itself is unusable. The only failure shown to the user.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request cancelled")]
    Cancelled,
}

/// Resolves a link into a title and preview images.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve(
        &self,
        channel_id: &str,
        url: &Url,
        cancel: CancellationToken,
    ) -> Result<LinkMetadata, ResolveError>;
}

/// A file picked (or dropped/pasted) by the user, not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
}

impl SelectedFile {
    /// Describe a local file from its metadata.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Cannot read file: {}", path.display()))?;
        if !metadata.is_file() {
            bail!("Not a regular file: {}", path.display());
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("Path has no file name: {}", path.display()))?;

        Ok(Self {
            name,
            size: metadata.len(),
            path: path.to_path_buf(),
        })
    }
}

/// Per-request data sent along with an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata {
    pub channel_id: String,
    /// Correlates callbacks with the request that produced them.
    pub client_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: u64,
}

impl UploadProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.loaded.min(self.total) * 100) / self.total) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("upload cancelled")]
    Cancelled,

    #[error("upload failed: {0}")]
    Transport(String),
}

/// Receives the lifecycle of one upload.
pub trait UploadListener: Send + Sync {
    fn on_progress(&self, progress: UploadProgress);
    fn on_success(&self, files: Vec<FileRecord>);
    fn on_error(&self, error: UploadError);
}

/// Cancelable reference to a submitted upload.
#[derive(Debug, Clone)]
pub struct UploadHandle {
    token: CancellationToken,
}

impl UploadHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Stop the upload. No listener method is called afterwards.
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub trait UploadService: Send + Sync {
    fn submit(
        &self,
        file: SelectedFile,
        metadata: UploadMetadata,
        listener: Arc<dyn UploadListener>,
    ) -> UploadHandle;
}

/// Result of a persistence call. `data == true` is the only success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitResponse {
    pub data: bool,
}

/// Create-or-update operation supplied by whoever opened the editor.
#[async_trait]
pub trait CommitBookmark: Send + Sync {
    async fn commit(&self, payload: BookmarkPayload) -> Result<CommitResponse>;
}

/// Read-only view of stored file records.
pub trait FileStore: Send + Sync {
    fn lookup(&self, file_id: &str) -> Option<FileRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_progress_percent() {
        assert_eq!(UploadProgress { loaded: 0, total: 200 }.percent(), 0);
        assert_eq!(UploadProgress { loaded: 50, total: 200 }.percent(), 25);
        assert_eq!(UploadProgress { loaded: 300, total: 200 }.percent(), 100);
        assert_eq!(UploadProgress { loaded: 0, total: 0 }.percent(), 100);
    }

    #[test]
    fn test_upload_handle_abort() {
        let handle = UploadHandle::new(CancellationToken::new());
        let clone = handle.clone();
        assert!(!clone.is_aborted());
        handle.abort();
        assert!(clone.is_aborted());
    }

    #[tokio::test]
    async fn test_selected_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let file = SelectedFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.size, 5);
        assert_eq!(file.path, path);
    }

    #[tokio::test]
    async fn test_selected_file_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SelectedFile::from_path(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_selected_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            SelectedFile::from_path(&dir.path().join("nope"))
                .await
                .is_err()
        );
    }
}
