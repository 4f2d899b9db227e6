//! Configuration persistence for the engine.
//!
//! Re-exports the shared Config from signflow-common, adds tracing output,
//! and derives session settings from it.

pub use signflow_common::config::Config;

use std::time::Duration;
use tracing::info;

use crate::session::PlaybackSettings;
use crate::speech::CaptureSettings;

/// Load configuration with tracing output.
pub fn load_config() -> Config {
    let path = Config::config_path();
    let config = Config::load();
    info!("[Config] Loaded config from {:?}", path);
    config
}

/// Save configuration with tracing output.
pub fn save_config(config: &Config) -> std::io::Result<()> {
    let path = Config::config_path();
    config.save()?;
    info!("[Config] Saved config to {:?}", path);
    Ok(())
}

impl From<&Config> for PlaybackSettings {
    fn from(config: &Config) -> Self {
        Self {
            dwell: Duration::from_millis(config.display_dwell_ms),
            max_phrase_words: config.max_phrase_words.max(1),
        }
    }
}

impl From<&Config> for CaptureSettings {
    fn from(config: &Config) -> Self {
        Self {
            restart_debounce: Duration::from_millis(config.restart_debounce_ms),
            language: config.recognition_language.clone(),
        }
    }
}
