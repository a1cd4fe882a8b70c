//! Persisted user settings

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::voice::VoiceParams;

/// What the user chose last time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSettings {
    /// Voice used for narration
    pub voice: VoiceParams,
    /// Clicking a passage seeks playback to it
    pub click_to_seek: bool,
    /// Continue with the next chapter when the queue ends
    pub auto_next_chapter: bool,
    /// Keep the passage being read in view
    pub auto_scroll: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            voice: VoiceParams::default(),
            click_to_seek: false,
            auto_next_chapter: false,
            auto_scroll: true,
        }
    }
}

/// JSON file holding [`UserSettings`]
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store backed by the file at `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `settings.json` in the platform data directory
    #[must_use]
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "narrator").map_or_else(
            || PathBuf::from("settings.json"),
            |d| d.data_dir().join("settings.json"),
        )
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings, falling back to defaults when absent or unreadable
    #[must_use]
    pub fn load(&self) -> UserSettings {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return UserSettings::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read settings");
                return UserSettings::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to parse settings, using defaults"
            );
            UserSettings::default()
        })
    }

    /// Write the settings, creating parent directories as needed
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self, settings: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, json)?;
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}
