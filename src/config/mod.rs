pub mod model;
pub mod writer;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::model::Settings;
use crate::config::writer::atomic_write;

/// Return the XDG-compliant config file path.
///
/// - Linux/macOS: ~/.config/bmedit/config.toml
/// - Windows: %APPDATA%\bmedit\config.toml
pub fn config_path() -> PathBuf {
    let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
    config_dir.join("bmedit").join("config.toml")
}

/// Load settings with an optional custom path override.
/// Priority: custom_path → XDG default.
pub fn load_with_override(custom_path: Option<&str>) -> Result<Settings> {
    let path = resolve_config_path(custom_path);
    load_from(&path)
}

/// Resolve the effective config path from an optional override.
fn resolve_config_path(custom_path: Option<&str>) -> PathBuf {
    match custom_path {
        Some(p) => PathBuf::from(shellexpand::tilde(p).to_string()),
        None => config_path(),
    }
}

/// Load settings from a specific path.
///
/// If the file doesn't exist, writes the defaults there and returns them.
pub fn load_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        let settings = Settings::default();
        save_to(&settings, path)?;
        info!(path = %path.display(), "created default config");
        return Ok(settings);
    }

    check_permissions(path);

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let settings: Settings = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if settings.max_file_size == 0 {
        warn!(path = %path.display(), "max_file_size is 0; every upload will be rejected");
    }

    Ok(settings)
}

/// Save settings to a specific path via atomic write.
pub fn save_to(settings: &Settings, path: &Path) -> Result<()> {
    atomic_write(settings, path)
}

/// Warn if the config file has permissions wider than 0600 on Unix.
#[cfg(unix)]
fn check_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(metadata) = fs::metadata(path) {
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o600 {
            warn!(
                path = %path.display(),
                "config file has permissions {:o} (expected 600)",
                mode
            );
        }
    }
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) {}
