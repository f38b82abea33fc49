//! Bookmark editing session.
//!
//! A [`BookmarkEditor`] owns the field state of one create/edit session and
//! drives two pipelines: link metadata resolution (debounced typing, commit on
//! blur or paste) and file upload (validate, submit, track progress). Work
//! started by the pipelines runs on spawned tasks that post [`EditorEvent`]s
//! back to the session; the caller pumps them with [`BookmarkEditor::process_next`]
//! or [`BookmarkEditor::run_until_idle`]. Events for work the session no longer
//! cares about are dropped on arrival.

mod commit;
mod debounce;
mod file;
mod link;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub use commit::CommitOutcome;
pub use file::file_too_large_message;
pub use link::{LinkParseError, canonical_link, normalize_link, select_preview_image};
pub use state::{EditorState, PendingUpload};

use crate::config::model::{BookmarkKind, BookmarkRecord, FileRecord, Settings};
use crate::services::{
    CommitBookmark, FileStore, LinkMetadata, LinkResolver, ResolveError, SelectedFile,
    UploadError, UploadProgress, UploadService,
};
use debounce::LinkDebouncer;
use file::CurrentUpload;

pub const LINK_INVALID_MESSAGE: &str = "Please enter a valid link";
pub const FILE_EMPTY_MESSAGE: &str = "This file is empty and can't be uploaded";
pub const UPLOAD_FAILED_MESSAGE: &str = "There was an error uploading the file";
pub const SAVE_FAILED_MESSAGE: &str = "There was an error saving the bookmark";
pub const SAVE_INVALID_LINK_MESSAGE: &str = "The link could not be saved: it is not a valid web address";
pub const FILE_MISSING_MESSAGE: &str = "The attached file is no longer available";

/// Results posted back to the session by its background work.
#[derive(Debug)]
pub enum EditorEvent {
    LinkQuietPeriodElapsed {
        generation: u64,
        value: String,
    },
    LinkResolved {
        link: String,
        result: Result<LinkMetadata, ResolveError>,
    },
    UploadProgress {
        client_id: String,
        progress: UploadProgress,
    },
    UploadSucceeded {
        client_id: String,
        files: Vec<FileRecord>,
    },
    UploadFailed {
        client_id: String,
        error: UploadError,
    },
}

/// Collaborators a session needs.
#[derive(Clone)]
pub struct EditorServices {
    pub resolver: Arc<dyn LinkResolver>,
    pub uploads: Arc<dyn UploadService>,
    pub files: Arc<dyn FileStore>,
    pub persistence: Arc<dyn CommitBookmark>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorOptions {
    pub channel_id: String,
    pub max_file_size: u64,
    pub link_previews: bool,
    pub link_debounce: Duration,
}

impl EditorOptions {
    pub fn from_settings(settings: &Settings, channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            max_file_size: settings.max_file_size,
            link_previews: settings.link_previews,
            link_debounce: settings.link_debounce(),
        }
    }
}

/// What a session starts from.
#[derive(Debug, Clone, Default)]
pub struct SessionSeed {
    /// Record being edited; `None` creates a new bookmark.
    pub original: Option<BookmarkRecord>,
    /// Kind for a new bookmark. Ignored when editing.
    pub requested_kind: Option<BookmarkKind>,
    /// File picked before the session opened; uploaded right away.
    pub file: Option<SelectedFile>,
}

impl SessionSeed {
    pub fn create(kind: BookmarkKind) -> Self {
        Self {
            requested_kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn edit(original: BookmarkRecord) -> Self {
        Self {
            original: Some(original),
            ..Self::default()
        }
    }

    pub fn with_file(mut self, file: SelectedFile) -> Self {
        self.file = Some(file);
        self
    }
}

pub struct BookmarkEditor {
    state: EditorState,
    original: Option<BookmarkRecord>,
    options: EditorOptions,
    services: EditorServices,
    events_tx: UnboundedSender<EditorEvent>,
    events_rx: UnboundedReceiver<EditorEvent>,
    debouncer: LinkDebouncer,
    resolution: Option<CancellationToken>,
    upload: Option<CurrentUpload>,
    closed: bool,
}

impl BookmarkEditor {
    /// Open a session. Must be called inside a tokio runtime when the seed
    /// carries a file.
    pub fn open(seed: SessionSeed, options: EditorOptions, services: EditorServices) -> Self {
        let kind = seed
            .original
            .as_ref()
            .map(|o| o.kind)
            .or(seed.requested_kind)
            .unwrap_or_default();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        debug!(%kind, editing = seed.original.is_some(), "bookmark editor opened");
        let mut editor = Self {
            state: EditorState::seeded(kind, seed.original.as_ref()),
            debouncer: LinkDebouncer::new(options.link_debounce),
            original: seed.original,
            options,
            services,
            events_tx,
            events_rx,
            resolution: None,
            upload: None,
            closed: false,
        };

        if let Some(file) = seed.file {
            editor.select_file(file);
        }
        editor
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn kind(&self) -> BookmarkKind {
        self.state.kind
    }

    pub fn original(&self) -> Option<&BookmarkRecord> {
        self.original.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn display_name(&self) -> String {
        self.state
            .display_name(self.original.as_ref(), self.services.files.as_ref())
    }

    pub fn file_record(&self) -> Option<FileRecord> {
        self.state.file_record(self.services.files.as_ref())
    }

    pub fn is_dirty(&self) -> bool {
        self.state
            .is_dirty(self.original.as_ref(), self.services.files.as_ref())
    }

    pub fn is_valid(&self) -> bool {
        self.state
            .is_valid(self.original.as_ref(), self.services.files.as_ref())
    }

    pub fn controls_visible(&self) -> bool {
        self.state
            .controls_visible(self.original.as_ref(), self.services.files.as_ref())
    }

    pub fn confirm_enabled(&self) -> bool {
        self.state
            .confirm_enabled(self.original.as_ref(), self.services.files.as_ref())
    }

    pub fn set_display_name(&mut self, name: &str) {
        if !self.closed {
            self.state.display_name = Some(name.to_string());
        }
    }

    /// Forget the typed title so the derived name shows again.
    pub fn clear_display_name(&mut self) {
        if !self.closed {
            self.state.display_name = None;
        }
    }

    pub fn set_emoji(&mut self, emoji: &str) {
        if !self.closed {
            self.state.emoji = emoji.to_string();
        }
    }

    /// Apply one event. Events arriving after teardown are ignored.
    pub fn handle_event(&mut self, event: EditorEvent) {
        if self.closed {
            trace!(?event, "event after close");
            return;
        }

        match event {
            EditorEvent::LinkQuietPeriodElapsed { generation, value } => {
                if self.debouncer.fire(generation) {
                    self.commit_link(&value);
                }
            }
            EditorEvent::LinkResolved { link, result } => self.apply_resolution(link, result),
            EditorEvent::UploadProgress {
                client_id,
                progress,
            } => self.apply_upload_progress(client_id, progress),
            EditorEvent::UploadSucceeded { client_id, files } => {
                self.apply_upload_success(client_id, files)
            }
            EditorEvent::UploadFailed { client_id, error } => {
                self.apply_upload_failure(client_id, error)
            }
        }
    }

    /// Whether a debounce, metadata request or upload is still outstanding.
    pub fn has_outstanding_work(&self) -> bool {
        !self.closed
            && (self.debouncer.is_armed() || self.resolution.is_some() || self.upload.is_some())
    }

    /// Apply events that are already queued, without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while !self.closed {
            let Ok(event) = self.events_rx.try_recv() else {
                break;
            };
            self.handle_event(event);
            applied += 1;
        }
        applied
    }

    /// Wait for and apply the next event. Returns false once nothing is
    /// outstanding.
    pub async fn process_next(&mut self) -> bool {
        if self.closed {
            return false;
        }
        if let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            return true;
        }
        if !self.has_outstanding_work() {
            return false;
        }

        match self.events_rx.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Drive the session until every pipeline has settled.
    pub async fn run_until_idle(&mut self) {
        while self.process_next().await {}
    }

    /// Abandon the session. Cancels the debounce, any metadata request and
    /// any upload; later results are dropped.
    pub fn cancel(&mut self) {
        if !self.closed {
            debug!("bookmark editor cancelled");
        }
        self.close();
    }

    fn close(&mut self) {
        self.closed = true;
        self.debouncer.cancel();
        if let Some(token) = self.resolution.take() {
            token.cancel();
        }
        self.state.pending_resolution_for = None;
        self.abort_upload();
    }
}

impl Drop for BookmarkEditor {
    fn drop(&mut self) {
        self.close();
    }
}
