use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tempfile::NamedTempFile;

/// Atomically write a TOML document to disk using tempfile-then-rename.
///
/// The temp file is created next to the target so the rename never crosses
/// filesystems. On Unix the result is readable by the owner only.
pub fn atomic_write<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let toml_str = toml::to_string_pretty(value).context("Failed to serialize to TOML")?;

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let temp_file = NamedTempFile::new_in(parent).context("Failed to create temporary file")?;

    fs::write(temp_file.path(), &toml_str).context("Failed to write temporary file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(temp_file.path(), perms).context("Failed to set file permissions")?;
    }

    temp_file
        .persist(path)
        .with_context(|| format!("Failed to atomically replace {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::Settings;

    #[test]
    fn test_atomic_write_creates_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let settings = Settings::default();

        atomic_write(&settings, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: Settings = toml::from_str(&content).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("config.toml");

        atomic_write(&Settings::default(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_atomic_write_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        atomic_write(&Settings::default(), &path).unwrap();

        let changed = Settings {
            link_previews: false,
            data_dir: Some("/srv/bookmarks".into()),
            ..Settings::default()
        };
        atomic_write(&changed, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: Settings = toml::from_str(&content).unwrap();
        assert!(!parsed.link_previews);
        assert_eq!(parsed.data_dir.as_deref(), Some("/srv/bookmarks"));
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_permissions_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        atomic_write(&Settings::default(), &path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
