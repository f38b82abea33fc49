use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    SelectedFile, UploadError, UploadHandle, UploadListener, UploadMetadata, UploadProgress,
    UploadService,
};
use crate::config::model::{FileRecord, file_extension};
use crate::store::BookmarkStore;

const CHUNK_SIZE: usize = 64 * 1024;

/// Stores uploads in the bookmark store's data directory.
///
/// Content is copied to `files/<file_id>/<name>` through a `.part` file that
/// is renamed once complete, then registered with the store.
pub struct LocalUploadService {
    store: Arc<BookmarkStore>,
}

impl LocalUploadService {
    pub fn new(store: Arc<BookmarkStore>) -> Self {
        Self { store }
    }
}

impl UploadService for LocalUploadService {
    fn submit(
        &self,
        file: SelectedFile,
        metadata: UploadMetadata,
        listener: Arc<dyn UploadListener>,
    ) -> UploadHandle {
        let token = CancellationToken::new();
        let handle = UploadHandle::new(token.clone());
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            let file_id = Uuid::new_v4().to_string();
            let target_dir = store.files_dir().join(&file_id);
            debug!(client_id = %metadata.client_id, %file_id, name = %file.name, "upload started");

            match copy_into_store(&file, &target_dir, &token, listener.as_ref()).await {
                Ok(Some((path, size, digest))) => {
                    let record = FileRecord {
                        id: file_id,
                        name: stored_name(&file.name),
                        size,
                        extension: file_extension(&file.name),
                        sha256: Some(digest),
                        create_at: Utc::now(),
                    };
                    if token.is_cancelled() {
                        discard(&target_dir).await;
                        return;
                    }
                    if let Err(e) = store.register_file(record.clone()) {
                        warn!("Failed to register upload {}: {e:#}", path.display());
                        discard(&target_dir).await;
                        listener.on_error(UploadError::Transport(e.to_string()));
                        return;
                    }
                    info!(file_id = %record.id, size = record.size, "upload stored");
                    listener.on_success(vec![record]);
                }
                Ok(None) => {
                    debug!(client_id = %metadata.client_id, "upload cancelled");
                    discard(&target_dir).await;
                }
                Err(e) => {
                    warn!("Upload of {} failed: {e:#}", file.path.display());
                    discard(&target_dir).await;
                    if !token.is_cancelled() {
                        listener.on_error(UploadError::Transport(e.to_string()));
                    }
                }
            }
        });

        handle
    }
}

/// Final path component of a user-supplied name.
fn stored_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "upload".to_string())
}

/// Copy in chunks, reporting progress. `Ok(None)` when cancelled.
async fn copy_into_store(
    file: &SelectedFile,
    target_dir: &Path,
    token: &CancellationToken,
    listener: &dyn UploadListener,
) -> Result<Option<(PathBuf, u64, String)>> {
    if token.is_cancelled() {
        return Ok(None);
    }

    fs::create_dir_all(target_dir)
        .await
        .with_context(|| format!("Failed to create {}", target_dir.display()))?;

    let name = stored_name(&file.name);
    let final_path = target_dir.join(&name);
    let part_path = target_dir.join(format!("{name}.part"));

    let mut source = File::open(&file.path)
        .await
        .with_context(|| format!("Cannot open {}", file.path.display()))?;
    let mut dest = File::create(&part_path)
        .await
        .with_context(|| format!("Cannot create {}", part_path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut loaded: u64 = 0;

    loop {
        if token.is_cancelled() {
            return Ok(None);
        }
        let n = source
            .read(&mut buf)
            .await
            .with_context(|| format!("Failed reading {}", file.path.display()))?;
        if n == 0 {
            break;
        }
        dest.write_all(&buf[..n])
            .await
            .context("Failed writing upload")?;
        hasher.update(&buf[..n]);
        loaded += n as u64;

        listener.on_progress(UploadProgress {
            loaded,
            total: file.size.max(loaded),
        });
        tokio::task::yield_now().await;
    }

    dest.flush().await.context("Failed flushing upload")?;
    drop(dest);

    if token.is_cancelled() {
        return Ok(None);
    }
    fs::rename(&part_path, &final_path)
        .await
        .with_context(|| format!("Failed to finalize {}", final_path.display()))?;

    Ok(Some((final_path, loaded, format!("{:x}", hasher.finalize()))))
}

async fn discard(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove partial upload {}: {}", dir.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::FileStore;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Debug)]
    enum Seen {
        Progress(UploadProgress),
        Success(Vec<FileRecord>),
        Error(UploadError),
    }

    struct ChannelListener(mpsc::UnboundedSender<Seen>);

    impl UploadListener for ChannelListener {
        fn on_progress(&self, progress: UploadProgress) {
            let _ = self.0.send(Seen::Progress(progress));
        }
        fn on_success(&self, files: Vec<FileRecord>) {
            let _ = self.0.send(Seen::Success(files));
        }
        fn on_error(&self, error: UploadError) {
            let _ = self.0.send(Seen::Error(error));
        }
    }

    fn metadata() -> UploadMetadata {
        UploadMetadata {
            channel_id: "dev".into(),
            client_id: "c1".into(),
        }
    }

    async fn write_source(dir: &Path, name: &str, len: usize) -> SelectedFile {
        let path = dir.join(name);
        let content: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &content).await.unwrap();
        SelectedFile::from_path(&path).await.unwrap()
    }

    #[tokio::test]
    async fn test_upload_copies_and_registers() {
        let src = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let store = Arc::new(BookmarkStore::open(data.path()).unwrap());
        let service = LocalUploadService::new(Arc::clone(&store));
        let file = write_source(src.path(), "Report.PDF", 200_000).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        service.submit(file.clone(), metadata(), Arc::new(ChannelListener(tx)));

        let mut progress = Vec::new();
        let files = loop {
            match rx.recv().await.unwrap() {
                Seen::Progress(p) => progress.push(p),
                Seen::Success(files) => break files,
                Seen::Error(e) => panic!("upload failed: {e}"),
            }
        };

        assert!(!progress.is_empty());
        assert_eq!(progress.last().unwrap().loaded, 200_000);
        assert!(progress.windows(2).all(|w| w[0].loaded < w[1].loaded));

        let record = &files[0];
        assert_eq!(record.name, "Report.PDF");
        assert_eq!(record.extension, "pdf");
        assert_eq!(record.size, 200_000);
        assert_eq!(record.sha256.as_deref().map(str::len), Some(64));

        let stored = store.files_dir().join(&record.id).join("Report.PDF");
        assert_eq!(fs::read(&stored).await.unwrap(), fs::read(&file.path).await.unwrap());
        assert_eq!(store.lookup(&record.id).as_ref(), Some(record));
    }

    #[tokio::test]
    async fn test_abort_before_start_is_silent() {
        let src = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let store = Arc::new(BookmarkStore::open(data.path()).unwrap());
        let service = LocalUploadService::new(Arc::clone(&store));
        let file = write_source(src.path(), "big.bin", 500_000).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = service.submit(file, metadata(), Arc::new(ChannelListener(tx)));
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        let mut entries = fs::read_dir(store.files_dir()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_source_reports_error() {
        let data = tempfile::tempdir().unwrap();
        let store = Arc::new(BookmarkStore::open(data.path()).unwrap());
        let service = LocalUploadService::new(store);
        let file = SelectedFile {
            name: "gone.txt".into(),
            size: 10,
            path: data.path().join("gone.txt"),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        service.submit(file, metadata(), Arc::new(ChannelListener(tx)));

        match rx.recv().await.unwrap() {
            Seen::Error(UploadError::Transport(_)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stored_name_strips_directories() {
        assert_eq!(stored_name("../../etc/passwd"), "passwd");
        assert_eq!(stored_name("notes.txt"), "notes.txt");
        assert_eq!(stored_name(".."), "upload");
    }
}
