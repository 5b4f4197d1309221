use crate::config::default_settings_path;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Receives "this file was used" notices from the session.
pub trait SettingsStore: Send {
    fn set_last_file(&mut self, path: &Path) -> Result<()>;
}

// App settings. Only the last file is ours; the rest belongs to other parts
// of the app and is written back as found.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    last_opened_file: Option<String>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

/// Settings kept in a JSON file, by default `~/.config/marksync/settings.json`.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(default_settings_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File to reopen on launch, if one was recorded.
    pub fn last_opened_file(&self) -> Option<PathBuf> {
        self.load().last_opened_file.map(PathBuf::from)
    }

    fn load(&self) -> Settings {
        self.load_strict().unwrap_or_default()
    }

    /// Like `load`, but a file that exists and cannot be read or parsed is
    /// an error, so it is never overwritten with defaults.
    fn load_strict(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read settings {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid settings {}", self.path.display()))
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let content = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write settings {}", self.path.display()))?;
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn set_last_file(&mut self, path: &Path) -> Result<()> {
        let mut settings = self.load_strict()?;
        settings.last_opened_file = Some(path.to_string_lossy().into_owned());
        self.save(&settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonSettingsStore::new(dir.path().join("settings.json"));
        assert!(store.last_opened_file().is_none());

        let data = dir.path().join("bookmarks.json");
        store.set_last_file(&data).unwrap();
        assert_eq!(store.last_opened_file(), Some(data));
    }

    #[test]
    fn test_other_keys_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "lastOpenedFile": "/old.json", "geminiModel": "models/x", "geminiPrompt": "p" }"#,
        )
        .unwrap();

        let mut store = JsonSettingsStore::new(&path);
        store.set_last_file(Path::new("/new.json")).unwrap();

        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["lastOpenedFile"], "/new.json");
        assert_eq!(saved["geminiModel"], "models/x");
        assert_eq!(saved["geminiPrompt"], "p");
    }

    #[test]
    fn test_malformed_settings_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let original = r#"{ "geminiApiKey": "secret", "geminiModel": "m", }"#;
        std::fs::write(&path, original).unwrap();

        let mut store = JsonSettingsStore::new(&path);
        let err = store.set_last_file(Path::new("/new.json")).unwrap_err();
        assert!(err.to_string().contains("invalid settings"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);

        // Reading still degrades to nothing recorded.
        assert!(store.last_opened_file().is_none());
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonSettingsStore::new(dir.path().join("missing").join("settings.json"));
        assert!(store.set_last_file(Path::new("/a.json")).is_err());
    }
}
