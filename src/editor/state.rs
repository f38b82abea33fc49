use crate::config::model::{BookmarkKind, BookmarkRecord, FileRecord};
use crate::services::{FileStore, UploadProgress};

/// Latest progress snapshot of the upload in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub progress: UploadProgress,
    pub client_id: String,
}

/// Canonical field values of one editing session.
///
/// Everything a caller displays is derived from these fields on read
/// (see the `display_name`, `is_dirty`, `is_valid` family); nothing derived
/// is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorState {
    pub kind: BookmarkKind,

    /// Title typed by the user. Blank counts as absent.
    pub display_name: Option<String>,
    /// Fallback name from the pipelines (page title, file name, raw link).
    pub derived_name: Option<String>,
    pub emoji: String,

    pub raw_link_input: String,
    pub committed_link: String,
    pub link_error: String,
    pub resolved_icon: String,
    /// Link a metadata request is in flight for.
    pub pending_resolution_for: Option<String>,

    pub pending_upload: Option<PendingUpload>,
    pub file_error: String,
    pub committed_file_id: Option<String>,

    pub saving: bool,
    pub save_error: String,
}

impl EditorState {
    /// Initial state for a session, seeded from the record being edited.
    pub fn seeded(kind: BookmarkKind, original: Option<&BookmarkRecord>) -> Self {
        let Some(record) = original else {
            return Self {
                kind,
                ..Self::default()
            };
        };

        let link = record.link_url.clone().unwrap_or_default();
        Self {
            kind,
            display_name: Some(record.display_name.clone()),
            emoji: record.emoji.clone(),
            raw_link_input: link.clone(),
            committed_link: link,
            resolved_icon: record.image_url.clone().unwrap_or_default(),
            committed_file_id: record.file_id.clone(),
            ..Self::default()
        }
    }

    /// Stored record of the committed file, looked up fresh on every call.
    pub fn file_record(&self, files: &dyn FileStore) -> Option<FileRecord> {
        self.committed_file_id
            .as_deref()
            .and_then(|id| files.lookup(id))
    }

    /// Name shown for the bookmark: typed title, else pipeline name, else
    /// the stored file's name (file) or the original link (link).
    pub fn display_name(&self, original: Option<&BookmarkRecord>, files: &dyn FileStore) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        if let Some(name) = self.derived_name.as_deref() {
            return name.to_string();
        }

        let fallback = match self.kind {
            BookmarkKind::File => self.file_record(files).map(|f| f.name),
            BookmarkKind::Link => original.and_then(|o| o.link_url.clone()),
        };
        fallback.unwrap_or_default()
    }

    pub fn is_dirty(&self, original: Option<&BookmarkRecord>, files: &dyn FileStore) -> bool {
        let original_name = original.map(|o| o.display_name.as_str()).unwrap_or("");
        if self.display_name(original, files) != original_name {
            return true;
        }

        let original_emoji = original.map(|o| o.emoji.as_str()).unwrap_or("");
        if !self.emoji.is_empty() && self.emoji != original_emoji {
            return true;
        }

        match self.kind {
            BookmarkKind::File => {
                let original_file = original.and_then(|o| o.file_id.as_deref());
                self.committed_file_id
                    .as_deref()
                    .is_some_and(|id| Some(id) != original_file)
            }
            BookmarkKind::Link => {
                let original_link = original.and_then(|o| o.link_url.as_deref());
                !self.committed_link.is_empty()
                    && Some(self.committed_link.as_str()) != original_link
            }
        }
    }

    pub fn is_valid(&self, original: Option<&BookmarkRecord>, files: &dyn FileStore) -> bool {
        match self.kind {
            BookmarkKind::Link => !self.committed_link.is_empty() && self.link_error.is_empty(),
            BookmarkKind::File => {
                self.file_record(files).is_some()
                    && !self.display_name(original, files).is_empty()
                    && self.file_error.is_empty()
            }
        }
    }

    /// Whether the title/emoji controls should be offered. A new link
    /// bookmark has nothing to title until a link is in place.
    pub fn controls_visible(&self, original: Option<&BookmarkRecord>, files: &dyn FileStore) -> bool {
        match self.kind {
            BookmarkKind::File => true,
            BookmarkKind::Link => original.is_some() || self.is_valid(original, files),
        }
    }

    pub fn confirm_enabled(&self, original: Option<&BookmarkRecord>, files: &dyn FileStore) -> bool {
        self.is_valid(original, files) && self.is_dirty(original, files) && !self.saving
    }
}
