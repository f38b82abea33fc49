use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bytes per megabyte, used when presenting size limits to the user.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Characters never allowed in a bookmark display name.
const DISPLAY_NAME_FORBIDDEN: &[char] = &['\n', '\r', '\t', '\0'];

/// Maximum length of a display name, in characters.
const DISPLAY_NAME_MAX_CHARS: usize = 64;

/// Global application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Maximum size of an uploaded file, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Fetch titles and icons for links while editing.
    /// Disable on hosts that must not make outbound requests.
    #[serde(default = "default_true")]
    pub link_previews: bool,

    /// Quiet period after the last keystroke before a typed link is committed.
    #[serde(default = "default_link_debounce_ms")]
    pub link_debounce_ms: u64,

    /// Timeout for a single link metadata request (seconds).
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Where bookmarks and uploaded files live (supports ~ and $VAR expansion).
    /// Falls back to the platform data dir.
    pub data_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            link_previews: default_true(),
            link_debounce_ms: default_link_debounce_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            data_dir: None,
        }
    }
}

impl Settings {
    pub fn link_debounce(&self) -> Duration {
        Duration::from_millis(self.link_debounce_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Resolve the data directory: explicit setting (expanded) -> platform data dir.
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => shellexpand::full(dir)
                .map(|expanded| PathBuf::from(expanded.as_ref()))
                .map_err(|e| anyhow!("Failed to expand data_dir '{}': {}", dir, e)),
            None => Ok(dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from(".local/share"))
                .join("bmedit")),
        }
    }
}

/// Variant of a bookmark: an external link or an uploaded file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkKind {
    #[default]
    Link,
    File,
}

impl std::fmt::Display for BookmarkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookmarkKind::Link => write!(f, "link"),
            BookmarkKind::File => write!(f, "file"),
        }
    }
}

/// A persisted channel bookmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkRecord {
    pub id: String,

    pub channel_id: String,

    #[serde(rename = "type")]
    pub kind: BookmarkKind,

    pub display_name: String,

    /// Emoji shortcode shown next to the name (e.g. "rocket").
    #[serde(default)]
    pub emoji: String,

    /// Target URL (link bookmarks only).
    pub link_url: Option<String>,

    /// Preview icon picked from the link's metadata.
    pub image_url: Option<String>,

    /// Stored file id (file bookmarks only).
    pub file_id: Option<String>,

    #[serde(default)]
    pub sort_order: i64,

    pub create_at: DateTime<Utc>,

    pub update_at: DateTime<Utc>,
}

/// Descriptive record of an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,

    pub name: String,

    pub size: u64,

    /// Lowercased extension without the dot; empty when the name has none.
    #[serde(default)]
    pub extension: String,

    /// Hex sha256 of the stored content.
    pub sha256: Option<String>,

    pub create_at: DateTime<Utc>,
}

/// The finalized fields of a bookmark produced by the editor on confirm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkPayload {
    #[serde(rename = "type")]
    pub kind: BookmarkKind,
    pub display_name: String,
    pub emoji: String,
    pub link_url: Option<String>,
    pub image_url: Option<String>,
    pub file_id: Option<String>,
}

/// Validate a display name: non-empty, single line, bounded length.
pub fn validate_display_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Bookmark name cannot be empty");
    }

    if let Some(bad_char) = name.chars().find(|c| DISPLAY_NAME_FORBIDDEN.contains(c)) {
        bail!(
            "Bookmark name '{}' contains forbidden character {:?}",
            name,
            bad_char
        );
    }

    let len = name.chars().count();
    if len > DISPLAY_NAME_MAX_CHARS {
        bail!(
            "Bookmark name is {} characters long (maximum {})",
            len,
            DISPLAY_NAME_MAX_CHARS
        );
    }

    Ok(())
}

/// Validate that a payload carries the fields its kind requires.
pub fn validate_payload(payload: &BookmarkPayload) -> Result<()> {
    validate_display_name(&payload.display_name)?;

    match payload.kind {
        BookmarkKind::Link => {
            if payload.link_url.as_deref().is_none_or(str::is_empty) {
                bail!("Link bookmarks require a link URL");
            }
            if payload.file_id.is_some() {
                bail!("Link bookmarks cannot reference a file");
            }
        }
        BookmarkKind::File => {
            if payload.file_id.as_deref().is_none_or(str::is_empty) {
                bail!("File bookmarks require a file id");
            }
            if payload.link_url.is_some() {
                bail!("File bookmarks cannot carry a link URL");
            }
        }
    }

    Ok(())
}

/// Lowercased extension of a file name, or an empty string.
pub fn file_extension(name: &str) -> String {
    std::path::Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

fn default_max_file_size() -> u64 {
    100 * BYTES_PER_MB
}

fn default_true() -> bool {
    true
}

fn default_link_debounce_ms() -> u64 {
    250
}

fn default_fetch_timeout_secs() -> u64 {
    8
}
