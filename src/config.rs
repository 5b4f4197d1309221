use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// Timing knobs for the sync layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Window in which rapid notifications collapse into one.
    pub coalesce_ms: u64,
    /// Notifications this soon after a local write are treated as its echo.
    pub suppression_ms: u64,
    /// Idle time after the last edit before `autosave` writes; `None` disables it.
    pub autosave_ms: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            coalesce_ms: 300,
            suppression_ms: 500,
            autosave_ms: None,
        }
    }
}

impl SyncConfig {
    pub fn coalesce(&self) -> Duration {
        Duration::from_millis(self.coalesce_ms)
    }

    pub fn suppression(&self) -> Duration {
        Duration::from_millis(self.suppression_ms)
    }

    pub fn autosave(&self) -> Option<Duration> {
        self.autosave_ms.map(Duration::from_millis)
    }

    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))
    }
}

/// `~/.config/marksync`, created if it does not exist yet.
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("could not determine home directory")?;
    let dir = Path::new(&home).join(".config").join("marksync");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir)
}

pub fn default_settings_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("settings.json"))
}
