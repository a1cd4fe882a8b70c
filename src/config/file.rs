//! TOML configuration file loading
//!
//! Supports `~/.config/narrator/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct NarratorConfigFile {
    /// Synthesis backend configuration
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Playback queue configuration
    #[serde(default)]
    pub queue: QueueFileConfig,

    /// Where user settings are persisted
    pub settings_path: Option<String>,
}

/// Synthesis backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// Base URL of the synthesis engine
    pub url: Option<String>,

    /// Longest text sent in one synthesis request, in characters
    pub max_chunk_chars: Option<usize>,
}

/// Playback queue configuration
#[derive(Debug, Default, Deserialize)]
pub struct QueueFileConfig {
    /// Entries synthesized ahead of the cursor
    pub prefetch_window: Option<usize>,

    /// Consecutive failures that halt playback
    pub max_consecutive_errors: Option<usize>,
}

/// Load the TOML config file from the standard path
///
/// Returns `NarratorConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> NarratorConfigFile {
    config_file_path().map_or_else(NarratorConfigFile::default, |path| {
        load_config_file_from(&path)
    })
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_file_from(path: &Path) -> NarratorConfigFile {
    if !path.exists() {
        return NarratorConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                NarratorConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            NarratorConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/narrator/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("narrator").join("config.toml"))
}
