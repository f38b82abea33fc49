//! In-memory collaborators for editor tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{
    CommitBookmark, CommitResponse, FileStore, LinkMetadata, LinkResolver, ResolveError,
    SelectedFile, UploadError, UploadHandle, UploadListener, UploadMetadata, UploadProgress,
    UploadService,
};
use crate::config::model::{BookmarkPayload, FileRecord, file_extension};

/// Resolver answering from a table keyed by normalized URL.
/// Unknown URLs fail with a network error.
#[derive(Default)]
pub struct FakeResolver {
    responses: Mutex<HashMap<String, Result<LinkMetadata, ResolveError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
    tokens: Mutex<Vec<CancellationToken>>,
}

impl FakeResolver {
    pub fn respond(&self, url: &str, result: Result<LinkMetadata, ResolveError>) {
        self.responses.lock().unwrap().insert(url.to_string(), result);
    }

    pub fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Cancellation tokens handed to each call, in call order.
    pub fn tokens(&self) -> Vec<CancellationToken> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkResolver for FakeResolver {
    async fn resolve(
        &self,
        _channel_id: &str,
        url: &Url,
        cancel: CancellationToken,
    ) -> Result<LinkMetadata, ResolveError> {
        let key = url.as_str().to_string();
        self.calls.lock().unwrap().push(key.clone());
        self.tokens.lock().unwrap().push(cancel);

        let delay = self.delays.lock().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Err(ResolveError::Network("no route".into())))
    }
}

#[derive(Default)]
pub struct FakeFileStore {
    records: Mutex<HashMap<String, FileRecord>>,
}

impl FakeFileStore {
    pub fn insert(&self, record: FileRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
    }
}

impl FileStore for FakeFileStore {
    fn lookup(&self, file_id: &str) -> Option<FileRecord> {
        self.records.lock().unwrap().get(file_id).cloned()
    }
}

/// Upload service that "stores" a file after `delay`, reporting halfway progress.
pub struct FakeUploads {
    files: Arc<FakeFileStore>,
    delay: Duration,
    fail: Mutex<bool>,
    submitted: Mutex<Vec<(SelectedFile, UploadMetadata)>>,
    handles: Mutex<Vec<UploadHandle>>,
}

impl FakeUploads {
    pub fn new(files: Arc<FakeFileStore>, delay: Duration) -> Self {
        Self {
            files,
            delay,
            fail: Mutex::new(false),
            submitted: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self) {
        *self.fail.lock().unwrap() = true;
    }

    pub fn submitted(&self) -> Vec<(SelectedFile, UploadMetadata)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn handles(&self) -> Vec<UploadHandle> {
        self.handles.lock().unwrap().clone()
    }
}

impl UploadService for FakeUploads {
    fn submit(
        &self,
        file: SelectedFile,
        metadata: UploadMetadata,
        listener: Arc<dyn UploadListener>,
    ) -> UploadHandle {
        self.submitted
            .lock()
            .unwrap()
            .push((file.clone(), metadata.clone()));

        let token = CancellationToken::new();
        let handle = UploadHandle::new(token.clone());
        self.handles.lock().unwrap().push(handle.clone());

        let fail = std::mem::take(&mut *self.fail.lock().unwrap());
        let files = Arc::clone(&self.files);
        let half = self.delay / 2;

        tokio::spawn(async move {
            tokio::time::sleep(half).await;
            if token.is_cancelled() {
                return;
            }
            listener.on_progress(UploadProgress {
                loaded: file.size / 2,
                total: file.size,
            });

            tokio::time::sleep(half).await;
            if token.is_cancelled() {
                return;
            }
            if fail {
                listener.on_error(UploadError::Transport("connection reset".into()));
                return;
            }

            let record = FileRecord {
                id: format!("file-{}", metadata.client_id),
                extension: file_extension(&file.name),
                name: file.name,
                size: file.size,
                sha256: None,
                create_at: Utc::now(),
            };
            files.insert(record.clone());
            listener.on_success(vec![record]);
        });

        handle
    }
}

/// Persistence that records payloads and answers with a scripted response.
pub struct FakeCommit {
    response: Mutex<Result<CommitResponse, String>>,
    payloads: Mutex<Vec<BookmarkPayload>>,
}

impl Default for FakeCommit {
    fn default() -> Self {
        Self {
            response: Mutex::new(Ok(CommitResponse { data: true })),
            payloads: Mutex::new(Vec::new()),
        }
    }
}

impl FakeCommit {
    pub fn answer(&self, response: Result<CommitResponse, String>) {
        *self.response.lock().unwrap() = response;
    }

    pub fn payloads(&self) -> Vec<BookmarkPayload> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommitBookmark for FakeCommit {
    async fn commit(&self, payload: BookmarkPayload) -> Result<CommitResponse> {
        self.payloads.lock().unwrap().push(payload);
        self.response.lock().unwrap().clone().map_err(|e| anyhow!(e))
    }
}
