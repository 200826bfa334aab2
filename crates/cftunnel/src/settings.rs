//! Persisted application settings.
//!
//! A single JSON file holds the directory where tunnel artifacts live:
//!
//! ```json
//! { "configDirectory": "/home/me/.local/share/cftunnel/tunnels" }
//! ```
//!
//! Loading never fails: a missing or malformed file yields defaults.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File name of the settings file inside the app config directory.
const SETTINGS_FILE: &str = "settings.json";

/// Application directory name under the platform config/data dirs.
const APP_DIR: &str = "cftunnel";

/// User-changeable settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Directory holding generated tunnel artifacts.
    #[serde(alias = "tunnels_dir", default = "default_config_directory")]
    pub config_directory: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_directory: default_config_directory(),
        }
    }
}

/// Default artifacts directory: `<data_local_dir>/cftunnel/tunnels`,
/// or `./tunnels` when the platform directory cannot be determined.
pub fn default_config_directory() -> PathBuf {
    dirs::data_local_dir().map_or_else(
        || PathBuf::from("tunnels"),
        |d| d.join(APP_DIR).join("tunnels"),
    )
}

/// Default settings file: `<config_dir>/cftunnel/settings.json`,
/// or `./settings.json` when the platform directory cannot be determined.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir().map_or_else(
        || PathBuf::from(SETTINGS_FILE),
        |d| d.join(APP_DIR).join(SETTINGS_FILE),
    )
}

/// Reads and writes [`Settings`] at a fixed path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults on a missing or malformed file.
    pub fn load(&self) -> Settings {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no settings at {}, using defaults", self.path.display());
                return Settings::default();
            }
            Err(e) => {
                tracing::warn!(
                    "failed to read settings {}: {e}; using defaults",
                    self.path.display()
                );
                return Settings::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(
                    "malformed settings {}: {e}; using defaults",
                    self.path.display()
                );
                Settings::default()
            }
        }
    }

    /// Persist settings via write-temp-then-rename.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(settings)?;
        let tmp = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        tracing::info!("saved settings to {}", self.path.display());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_else(|| SETTINGS_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> SettingsStore {
        SettingsStore::new(dir.join("settings.json"))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = store_in(dir.path()).load();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        fs::write(store.path(), "{ not json").expect("write");
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn save_then_load_returns_saved_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let settings = Settings {
            config_directory: PathBuf::from("/srv/tunnels"),
        };
        store.save(&settings).expect("save");
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn save_uses_camel_case_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store
            .save(&Settings {
                config_directory: PathBuf::from("/srv/tunnels"),
            })
            .expect("save");
        let raw = fs::read_to_string(store.path()).expect("read");
        assert!(raw.contains("\"configDirectory\": \"/srv/tunnels\""), "got: {raw}");
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store.save(&Settings::default()).expect("save");
        assert!(!dir.path().join("settings.json.tmp").exists());
    }

    #[test]
    fn save_creates_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::new(dir.path().join("nested/app/settings.json"));
        store.save(&Settings::default()).expect("save");
        assert!(store.path().exists());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        fs::write(
            store.path(),
            r#"{"configDirectory": "/a", "theme": "dark", "extra": 1}"#,
        )
        .expect("write");
        assert_eq!(store.load().config_directory, PathBuf::from("/a"));
    }

    #[test]
    fn legacy_tunnels_dir_key_is_accepted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        fs::write(store.path(), r#"{"tunnels_dir": "legacy"}"#).expect("write");
        assert_eq!(store.load().config_directory, PathBuf::from("legacy"));
    }

    #[test]
    fn missing_key_falls_back_to_default_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        fs::write(store.path(), "{}").expect("write");
        assert_eq!(store.load().config_directory, default_config_directory());
    }
}
