use tracing::{debug, info, warn};

use super::link::{canonical_link, normalize_link};
use super::{
    BookmarkEditor, FILE_MISSING_MESSAGE, SAVE_FAILED_MESSAGE, SAVE_INVALID_LINK_MESSAGE,
};
use crate::config::model::{BookmarkKind, BookmarkPayload};
use crate::services::CommitResponse;

/// What `confirm` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Saved; the session is closed.
    Saved,
    /// The persistence call failed; the session stays open for retry.
    Failed,
    /// The payload could not be built; `saving` stays set.
    Rejected,
    /// Confirm was not enabled; nothing happened.
    Disabled,
}

impl BookmarkEditor {
    /// Build the payload and hand it to the persistence operation.
    pub async fn confirm(&mut self) -> CommitOutcome {
        if self.closed || !self.confirm_enabled() {
            return CommitOutcome::Disabled;
        }

        self.state.saving = true;

        let payload = match self.build_payload() {
            Ok(payload) => payload,
            Err(message) => {
                warn!(%message, "bookmark payload rejected");
                self.state.save_error = message.to_string();
                return CommitOutcome::Rejected;
            }
        };

        debug!(kind = %payload.kind, name = %payload.display_name, "committing bookmark");
        match self.services.persistence.commit(payload).await {
            Ok(CommitResponse { data: true }) => {
                info!("bookmark saved");
                self.state.save_error.clear();
                self.close();
                CommitOutcome::Saved
            }
            Ok(CommitResponse { data: false }) => {
                warn!("bookmark save reported failure");
                self.fail_save()
            }
            Err(e) => {
                warn!(error = %e, "bookmark save errored");
                self.fail_save()
            }
        }
    }

    fn fail_save(&mut self) -> CommitOutcome {
        self.state.save_error = SAVE_FAILED_MESSAGE.to_string();
        self.state.saving = false;
        CommitOutcome::Failed
    }

    fn build_payload(&self) -> Result<BookmarkPayload, &'static str> {
        let display_name = self.display_name();
        let emoji = self.state.emoji.clone();

        match self.state.kind {
            BookmarkKind::Link => {
                let url = normalize_link(&self.state.committed_link)
                    .map_err(|_| SAVE_INVALID_LINK_MESSAGE)?;
                let image_url =
                    Some(self.state.resolved_icon.clone()).filter(|icon| !icon.is_empty());
                Ok(BookmarkPayload {
                    kind: BookmarkKind::Link,
                    display_name,
                    emoji,
                    link_url: Some(canonical_link(&url)),
                    image_url,
                    file_id: None,
                })
            }
            BookmarkKind::File => {
                let record = self.file_record().ok_or(FILE_MISSING_MESSAGE)?;
                Ok(BookmarkPayload {
                    kind: BookmarkKind::File,
                    display_name,
                    emoji,
                    link_url: None,
                    image_url: None,
                    file_id: Some(record.id),
                })
            }
        }
    }
}
