//! On-disk bookmark and file registry.
//!
//! Everything lives under the data directory: `bookmarks.toml` holds the
//! bookmark and file records, `files/<file_id>/<name>` the uploaded content.
//! Writers take an advisory lock on `bookmarks.lock`, reload, modify and
//! atomically replace the document, so two processes never lose each other's
//! changes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::model::{
    BookmarkKind, BookmarkPayload, BookmarkRecord, FileRecord, validate_payload,
};
use crate::config::writer::atomic_write;
use crate::services::{CommitBookmark, CommitResponse, FileStore};

const STORE_FILE: &str = "bookmarks.toml";
const LOCK_FILE: &str = "bookmarks.lock";
const FILES_DIR: &str = "files";

/// Serialized form of `bookmarks.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    pub bookmarks: Vec<BookmarkRecord>,

    #[serde(default)]
    pub files: Vec<FileRecord>,
}

pub struct BookmarkStore {
    root: PathBuf,
    cache: RwLock<StoreData>,
}

impl BookmarkStore {
    /// Open (or initialize) the store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root.join(FILES_DIR))
            .with_context(|| format!("Failed to create data directory: {}", root.display()))?;

        let data = load_data(&root.join(STORE_FILE))?;
        debug!(
            root = %root.display(),
            bookmarks = data.bookmarks.len(),
            files = data.files.len(),
            "bookmark store opened"
        );

        Ok(Self {
            root: root.to_path_buf(),
            cache: RwLock::new(data),
        })
    }

    /// Directory holding uploaded content.
    pub fn files_dir(&self) -> PathBuf {
        self.root.join(FILES_DIR)
    }

    /// Bookmarks ordered by channel then sort order, optionally for one channel.
    pub fn list(&self, channel_id: Option<&str>) -> Vec<BookmarkRecord> {
        let data = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let mut bookmarks: Vec<BookmarkRecord> = data
            .bookmarks
            .iter()
            .filter(|b| channel_id.is_none_or(|c| b.channel_id == c))
            .cloned()
            .collect();
        bookmarks.sort_by(|a, b| {
            a.channel_id
                .cmp(&b.channel_id)
                .then(a.sort_order.cmp(&b.sort_order))
        });
        bookmarks
    }

    pub fn get(&self, id: &str) -> Option<BookmarkRecord> {
        let data = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        data.bookmarks.iter().find(|b| b.id == id).cloned()
    }

    pub fn file(&self, id: &str) -> Option<FileRecord> {
        let data = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        data.files.iter().find(|f| f.id == id).cloned()
    }

    /// Add a bookmark at the end of its channel.
    pub fn create(&self, channel_id: &str, payload: BookmarkPayload) -> Result<BookmarkRecord> {
        validate_payload(&payload)?;

        let record = self.locked_modify(|data| -> Result<BookmarkRecord> {
            check_file_reference(data, &payload)?;

            let sort_order = data
                .bookmarks
                .iter()
                .filter(|b| b.channel_id == channel_id)
                .map(|b| b.sort_order + 1)
                .max()
                .unwrap_or(0);
            let now = Utc::now();
            let record = BookmarkRecord {
                id: Uuid::new_v4().to_string(),
                channel_id: channel_id.to_string(),
                kind: payload.kind,
                display_name: payload.display_name,
                emoji: payload.emoji,
                link_url: payload.link_url,
                image_url: payload.image_url,
                file_id: payload.file_id,
                sort_order,
                create_at: now,
                update_at: now,
            };
            data.bookmarks.push(record.clone());
            Ok(record)
        })??;

        info!(id = %record.id, channel = %record.channel_id, kind = %record.kind, "bookmark created");
        Ok(record)
    }

    /// Replace the editable fields of a bookmark. `Ok(None)` when no bookmark
    /// has that id.
    pub fn update(&self, id: &str, payload: BookmarkPayload) -> Result<Option<BookmarkRecord>> {
        validate_payload(&payload)?;

        let updated = self.locked_modify(|data| -> Result<Option<BookmarkRecord>> {
            check_file_reference(data, &payload)?;

            let Some(record) = data.bookmarks.iter_mut().find(|b| b.id == id) else {
                return Ok(None);
            };
            record.kind = payload.kind;
            record.display_name = payload.display_name;
            record.emoji = payload.emoji;
            record.link_url = payload.link_url;
            record.image_url = payload.image_url;
            record.file_id = payload.file_id;
            record.update_at = Utc::now().max(record.create_at);
            Ok(Some(record.clone()))
        })??;

        match &updated {
            Some(record) => info!(id = %record.id, "bookmark updated"),
            None => warn!(%id, "no bookmark to update"),
        }
        Ok(updated)
    }

    /// Record an uploaded file. Replaces a record with the same id.
    pub fn register_file(&self, record: FileRecord) -> Result<()> {
        let id = record.id.clone();
        self.locked_modify(|data| {
            data.files.retain(|f| f.id != record.id);
            data.files.push(record);
        })?;
        debug!(file_id = %id, "file registered");
        Ok(())
    }

    /// Load, modify and save under the store lock, then refresh the cache.
    fn locked_modify<T>(&self, modify: impl FnOnce(&mut StoreData) -> T) -> Result<T> {
        use fs2::FileExt;

        let lock_file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.root.join(LOCK_FILE))
            .context("Failed to open bookmark store lock file")?;

        FileExt::lock_exclusive(&lock_file).context("Failed to lock bookmark store")?;

        let path = self.root.join(STORE_FILE);
        let mut data = load_data(&path)?;
        let result = modify(&mut data);
        atomic_write(&data, &path)?;

        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = data;

        // Lock released when lock_file is dropped
        Ok(result)
    }
}

impl FileStore for BookmarkStore {
    fn lookup(&self, file_id: &str) -> Option<FileRecord> {
        self.file(file_id)
    }
}

fn load_data(path: &Path) -> Result<StoreData> {
    if !path.exists() {
        return Ok(StoreData::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read bookmark store: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse bookmark store: {}", path.display()))
}

fn check_file_reference(data: &StoreData, payload: &BookmarkPayload) -> Result<()> {
    if payload.kind != BookmarkKind::File {
        return Ok(());
    }
    let file_id = payload.file_id.as_deref().unwrap_or_default();
    if !data.files.iter().any(|f| f.id == file_id) {
        bail!("Unknown file id '{}'", file_id);
    }
    Ok(())
}

/// Persistence for a new bookmark in a channel.
pub struct CreateBookmark {
    pub store: Arc<BookmarkStore>,
    pub channel_id: String,
}

#[async_trait]
impl CommitBookmark for CreateBookmark {
    async fn commit(&self, payload: BookmarkPayload) -> Result<CommitResponse> {
        match self.store.create(&self.channel_id, payload) {
            Ok(_) => Ok(CommitResponse { data: true }),
            Err(e) => {
                warn!("Bookmark not created: {e:#}");
                Ok(CommitResponse { data: false })
            }
        }
    }
}

/// Persistence for edits to an existing bookmark.
pub struct UpdateBookmark {
    pub store: Arc<BookmarkStore>,
    pub bookmark_id: String,
}

#[async_trait]
impl CommitBookmark for UpdateBookmark {
    async fn commit(&self, payload: BookmarkPayload) -> Result<CommitResponse> {
        match self.store.update(&self.bookmark_id, payload) {
            Ok(updated) => Ok(CommitResponse {
                data: updated.is_some(),
            }),
            Err(e) => {
                warn!("Bookmark not updated: {e:#}");
                Ok(CommitResponse { data: false })
            }
        }
    }
}
