//! Configuration management for the narrator

pub mod file;

use std::path::PathBuf;

use crate::queue::QueueConfig;
use crate::settings::SettingsStore;
use crate::voice::{DEFAULT_BACKEND_URL, DEFAULT_MAX_CHUNK_CHARS};
use crate::{Error, Result};

pub use file::{NarratorConfigFile, config_file_path, load_config_file};

/// Narrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the synthesis engine
    pub backend_url: String,

    /// Longest text sent in one synthesis request, in characters
    pub max_chunk_chars: usize,

    /// Playback queue tuning
    pub queue: QueueConfig,

    /// Where user settings are persisted
    pub settings_path: PathBuf,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is malformed or out of range
    pub fn load() -> Result<Self> {
        // env > toml > default
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed config file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is malformed or out of range
    pub fn resolve(fc: NarratorConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let backend_url = env("NARRATOR_BACKEND_URL")
            .or(fc.backend.url)
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let max_chunk_chars = parse_count(&env, "NARRATOR_MAX_CHUNK_CHARS")?
            .or(fc.backend.max_chunk_chars)
            .unwrap_or(DEFAULT_MAX_CHUNK_CHARS);
        if max_chunk_chars == 0 {
            return Err(Error::Config("max_chunk_chars must be at least 1".to_string()));
        }

        let defaults = QueueConfig::default();
        let prefetch_window = parse_count(&env, "NARRATOR_PREFETCH_WINDOW")?
            .or(fc.queue.prefetch_window)
            .unwrap_or(defaults.prefetch_window);
        let max_consecutive_errors = parse_count(&env, "NARRATOR_MAX_CONSECUTIVE_ERRORS")?
            .or(fc.queue.max_consecutive_errors)
            .unwrap_or(defaults.max_consecutive_errors);
        if max_consecutive_errors == 0 {
            return Err(Error::Config(
                "max_consecutive_errors must be at least 1".to_string(),
            ));
        }

        let settings_path = env("NARRATOR_SETTINGS_PATH")
            .or(fc.settings_path)
            .map_or_else(SettingsStore::default_path, PathBuf::from);

        Ok(Self {
            backend_url,
            max_chunk_chars,
            queue: QueueConfig {
                prefetch_window,
                max_consecutive_errors,
                ..defaults
            },
            settings_path,
        })
    }
}

fn parse_count(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<usize>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::file::{BackendFileConfig, QueueFileConfig};

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = Config::resolve(NarratorConfigFile::default(), env_of(&[])).unwrap();
        assert_eq!(config.backend_url, "http://localhost:50032");
        assert_eq!(config.max_chunk_chars, 200);
        assert_eq!(config.queue.prefetch_window, 2);
        assert_eq!(config.queue.max_consecutive_errors, 3);
        assert!(config.settings_path.ends_with("settings.json"));
    }

    #[test]
    fn env_overrides_file() {
        let fc = NarratorConfigFile {
            backend: BackendFileConfig {
                url: Some("http://file:1".to_string()),
                max_chunk_chars: Some(120),
            },
            queue: QueueFileConfig {
                prefetch_window: Some(5),
                max_consecutive_errors: None,
            },
            settings_path: Some("/tmp/from-file.json".to_string()),
        };
        let env = env_of(&[
            ("NARRATOR_BACKEND_URL", "http://env:2"),
            ("NARRATOR_MAX_CONSECUTIVE_ERRORS", "7"),
        ]);

        let config = Config::resolve(fc, env).unwrap();
        assert_eq!(config.backend_url, "http://env:2");
        assert_eq!(config.max_chunk_chars, 120);
        assert_eq!(config.queue.prefetch_window, 5);
        assert_eq!(config.queue.max_consecutive_errors, 7);
        assert_eq!(config.settings_path, PathBuf::from("/tmp/from-file.json"));
    }

    #[test]
    fn rejects_zero_and_garbage() {
        let zero = Config::resolve(
            NarratorConfigFile::default(),
            env_of(&[("NARRATOR_MAX_CHUNK_CHARS", "0")]),
        );
        assert!(matches!(zero, Err(Error::Config(_))));

        let garbage = Config::resolve(
            NarratorConfigFile::default(),
            env_of(&[("NARRATOR_PREFETCH_WINDOW", "lots")]),
        );
        assert!(matches!(garbage, Err(Error::Config(_))));

        let no_threshold = Config::resolve(
            NarratorConfigFile::default(),
            env_of(&[("NARRATOR_MAX_CONSECUTIVE_ERRORS", "0")]),
        );
        assert!(matches!(no_threshold, Err(Error::Config(_))));
    }
}
