use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BookmarkEditor, EditorEvent, FILE_EMPTY_MESSAGE, UPLOAD_FAILED_MESSAGE};
use crate::config::model::{BYTES_PER_MB, FileRecord};
use crate::services::{
    SelectedFile, UploadError, UploadHandle, UploadListener, UploadMetadata, UploadProgress,
};

/// The upload this session is waiting on.
pub(super) struct CurrentUpload {
    pub client_id: String,
    pub handle: UploadHandle,
}

/// Forwards upload callbacks into the editor's event queue, tagged with the
/// request's client id.
struct EditorUploadListener {
    client_id: String,
    tx: UnboundedSender<EditorEvent>,
}

impl UploadListener for EditorUploadListener {
    fn on_progress(&self, progress: UploadProgress) {
        let _ = self.tx.send(EditorEvent::UploadProgress {
            client_id: self.client_id.clone(),
            progress,
        });
    }

    fn on_success(&self, files: Vec<FileRecord>) {
        let _ = self.tx.send(EditorEvent::UploadSucceeded {
            client_id: self.client_id.clone(),
            files,
        });
    }

    fn on_error(&self, error: UploadError) {
        let _ = self.tx.send(EditorEvent::UploadFailed {
            client_id: self.client_id.clone(),
            error,
        });
    }
}

/// Message for a file over the size limit.
pub fn file_too_large_message(name: &str, max_bytes: u64) -> String {
    let limit = if max_bytes % BYTES_PER_MB == 0 {
        format!("{}", max_bytes / BYTES_PER_MB)
    } else {
        format!("{:.1}", max_bytes as f64 / BYTES_PER_MB as f64)
    };
    format!("Files larger than {limit} MB cannot be uploaded: {name}")
}

impl BookmarkEditor {
    /// Validate and start uploading a file. Replaces any upload in flight.
    pub fn select_file(&mut self, file: SelectedFile) {
        if self.closed {
            return;
        }

        if file.size > self.options.max_file_size {
            info!(name = %file.name, size = file.size, "file exceeds upload limit");
            self.state.file_error = file_too_large_message(&file.name, self.options.max_file_size);
            return;
        }
        if file.size == 0 {
            info!(name = %file.name, "refusing empty file");
            self.state.file_error = FILE_EMPTY_MESSAGE.to_string();
            return;
        }

        self.state.file_error.clear();
        self.state.derived_name = Some(file.name.clone());
        self.state.committed_file_id = None;
        self.state.pending_upload = None;
        self.abort_upload();

        let client_id = Uuid::new_v4().to_string();
        let listener = Arc::new(EditorUploadListener {
            client_id: client_id.clone(),
            tx: self.events_tx.clone(),
        });
        let metadata = UploadMetadata {
            channel_id: self.options.channel_id.clone(),
            client_id: client_id.clone(),
        };

        debug!(name = %file.name, size = file.size, %client_id, "submitting upload");
        let handle = self.services.uploads.submit(file, metadata, listener);
        self.upload = Some(CurrentUpload { client_id, handle });
    }

    /// Drop the selected file and fall back to the saved one.
    pub fn remove_file(&mut self) {
        if self.closed {
            return;
        }
        self.state.pending_upload = None;
        self.state.committed_file_id = self.original.as_ref().and_then(|o| o.file_id.clone());
        self.state.derived_name = None;
        self.abort_upload();
    }

    pub(super) fn abort_upload(&mut self) {
        if let Some(upload) = self.upload.take() {
            debug!(client_id = %upload.client_id, "aborting upload");
            upload.handle.abort();
        }
    }

    fn is_current_upload(&self, client_id: &str) -> bool {
        self.upload
            .as_ref()
            .is_some_and(|upload| upload.client_id == client_id)
    }

    pub(super) fn apply_upload_progress(&mut self, client_id: String, progress: UploadProgress) {
        if !self.is_current_upload(&client_id) {
            debug!(%client_id, "progress from a replaced upload");
            return;
        }
        self.state.pending_upload = Some(super::PendingUpload {
            progress,
            client_id,
        });
    }

    pub(super) fn apply_upload_success(&mut self, client_id: String, files: Vec<FileRecord>) {
        if !self.is_current_upload(&client_id) {
            debug!(%client_id, "result from a replaced upload");
            return;
        }
        self.upload = None;
        self.state.pending_upload = None;

        match files.into_iter().next() {
            Some(record) => {
                debug!(file_id = %record.id, "upload stored");
                self.state.committed_file_id = Some(record.id);
                self.state.file_error.clear();
            }
            None => {
                warn!(%client_id, "upload finished without a file record");
                self.state.file_error = UPLOAD_FAILED_MESSAGE.to_string();
            }
        }
    }

    pub(super) fn apply_upload_failure(&mut self, client_id: String, error: UploadError) {
        if !self.is_current_upload(&client_id) {
            debug!(%client_id, "failure from a replaced upload");
            return;
        }
        warn!(%client_id, error = %error, "upload failed");
        self.upload = None;
        self.state.pending_upload = None;
        self.state.file_error = UPLOAD_FAILED_MESSAGE.to_string();
    }
}
