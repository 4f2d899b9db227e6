//! Configuration persistence for SignFlow.
//!
//! This module handles loading and saving configuration to a JSON file in the
//! user's configuration directory. It is shared between the engine and the CLI
//! so both read the same values.

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default time a still image or textual fallback stays on screen.
pub const DEFAULT_DISPLAY_DWELL_MS: u64 = 1500;

/// Default longest phrase, in words, tried by the matcher.
pub const DEFAULT_MAX_PHRASE_WORDS: usize = 3;

/// Default pause before restarting speech capture after it ends.
pub const DEFAULT_RESTART_DEBOUNCE_MS: u64 = 300;

/// Default speech recognition language.
pub const DEFAULT_RECOGNITION_LANGUAGE: &str = "en-US";

/// Persisted configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// How long images and fallbacks are displayed, in milliseconds
    #[serde(default = "default_display_dwell_ms")]
    pub display_dwell_ms: u64,
    /// Largest phrase window the matcher tries (1 disables phrase matching)
    #[serde(default = "default_max_phrase_words")]
    pub max_phrase_words: usize,
    /// Delay before speech capture is restarted after the source ends
    #[serde(default = "default_restart_debounce_ms")]
    pub restart_debounce_ms: u64,
    /// BCP-47 language tag handed to the speech recognizer
    #[serde(default = "default_recognition_language")]
    pub recognition_language: String,
    /// Sign library file; defaults to `library.json` in the data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_path: Option<PathBuf>,
}

fn default_display_dwell_ms() -> u64 {
    DEFAULT_DISPLAY_DWELL_MS
}

fn default_max_phrase_words() -> usize {
    DEFAULT_MAX_PHRASE_WORDS
}

fn default_restart_debounce_ms() -> u64 {
    DEFAULT_RESTART_DEBOUNCE_MS
}

fn default_recognition_language() -> String {
    DEFAULT_RECOGNITION_LANGUAGE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_dwell_ms: DEFAULT_DISPLAY_DWELL_MS,
            max_phrase_words: DEFAULT_MAX_PHRASE_WORDS,
            restart_debounce_ms: DEFAULT_RESTART_DEBOUNCE_MS,
            recognition_language: default_recognition_language(),
            library_path: None,
        }
    }
}

/// Keys accepted by [`Config::get_value`] and [`Config::set_value`].
pub const CONFIG_KEYS: &[&str] = &[
    "display_dwell_ms",
    "max_phrase_words",
    "restart_debounce_ms",
    "recognition_language",
    "library_path",
];

impl Config {
    /// Get the path to the configuration file.
    ///
    /// Returns platform-specific path:
    /// - Linux: ~/.config/signflow/config.json
    /// - macOS: ~/Library/Application Support/signflow/config.json
    /// - Windows: %APPDATA%\signflow\config.json
    pub fn config_path() -> PathBuf {
        BaseDirs::new()
            .map(|d| d.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("signflow")
            .join("config.json")
    }

    /// Get the application data directory, where the sign library lives.
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "signflow")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".").join("signflow-data"))
    }

    /// Resolved sign library location.
    pub fn library_file(&self) -> PathBuf {
        self.library_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("library.json"))
    }

    /// Load configuration from the default location.
    ///
    /// Returns the default configuration if the file doesn't exist or can't
    /// be parsed.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> io::Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;

        Ok(())
    }

    /// Read one configuration value as display text.
    pub fn get_value(&self, key: &str) -> Option<String> {
        match key {
            "display_dwell_ms" => Some(self.display_dwell_ms.to_string()),
            "max_phrase_words" => Some(self.max_phrase_words.to_string()),
            "restart_debounce_ms" => Some(self.restart_debounce_ms.to_string()),
            "recognition_language" => Some(self.recognition_language.clone()),
            "library_path" => Some(self.library_file().display().to_string()),
            _ => None,
        }
    }

    /// Parse and set one configuration value.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "display_dwell_ms" => self.display_dwell_ms = parse_number(key, value)?,
            "max_phrase_words" => {
                let words: usize = parse_number(key, value)?;
                if words == 0 {
                    return Err("max_phrase_words must be at least 1".to_string());
                }
                self.max_phrase_words = words;
            }
            "restart_debounce_ms" => self.restart_debounce_ms = parse_number(key, value)?,
            "recognition_language" => {
                let value = value.trim();
                if value.is_empty() {
                    return Err("recognition_language cannot be empty".to_string());
                }
                self.recognition_language = value.to_string();
            }
            "library_path" => {
                let value = value.trim();
                self.library_path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            _ => {
                return Err(format!(
                    "Unknown config key '{}'. Valid keys: {}",
                    key,
                    CONFIG_KEYS.join(", ")
                ))
            }
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid value for {}: '{}' is not a number", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.display_dwell_ms, 1500);
        assert_eq!(config.max_phrase_words, 3);
        assert_eq!(config.restart_debounce_ms, 300);
        assert_eq!(config.recognition_language, "en-US");
        assert!(config.library_path.is_none());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"display_dwell_ms": 900}"#).unwrap();
        assert_eq!(config.display_dwell_ms, 900);
        assert_eq!(config.max_phrase_words, DEFAULT_MAX_PHRASE_WORDS);
        assert_eq!(config.recognition_language, "en-US");
    }

    #[test]
    fn test_save_and_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.max_phrase_words = 4;
        config.library_path = Some(PathBuf::from("/tmp/signs.json"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_corrupt_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_set_value_validation() {
        let mut config = Config::default();
        config.set_value("display_dwell_ms", "2000").unwrap();
        assert_eq!(config.display_dwell_ms, 2000);

        assert!(config.set_value("display_dwell_ms", "soon").is_err());
        assert!(config.set_value("max_phrase_words", "0").is_err());
        assert!(config.set_value("colour", "blue").is_err());

        config.set_value("library_path", "/data/signs.json").unwrap();
        assert_eq!(
            config.get_value("library_path").as_deref(),
            Some("/data/signs.json")
        );
        config.set_value("library_path", "").unwrap();
        assert!(config.library_path.is_none());
    }
}
