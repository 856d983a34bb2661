//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory, by default
//! `~/.config/elevenlabs-tts/config.toml` on Linux. A different file can be
//! given on the command line.
//!
//! The config file is human-readable and editable. A missing or broken file
//! never stops the program: defaults are used and a warning is logged.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::Retention;
use crate::player::{LoopStatus, PlayerError, SessionOptions};

const APP_DIR: &str = "elevenlabs-tts";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Media player identity and initial playback state
    pub player: PlayerConfig,

    /// Text-to-speech provider settings
    pub speech: SpeechConfig,

    /// Clip cache and history retention
    pub cache: CacheConfig,
}

/// Media player settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Name shown by media controllers
    pub identity: String,

    /// Suffix of the well-known bus name `org.mpris.MediaPlayer2.<suffix>`
    pub bus_suffix: String,

    pub desktop_entry: String,

    /// Initial engine volume (may exceed 1.0)
    pub volume: f64,

    /// Initial loop status: "None", "Track" or "Playlist"
    pub loop_status: String,

    pub shuffle: bool,

    /// Position polling period while playing
    pub poll_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            identity: "ElevenLabs TTS".to_string(),
            bus_suffix: "elevenlabs_tts".to_string(),
            desktop_entry: "elevenlabs-tts".to_string(),
            volume: 1.0,
            loop_status: LoopStatus::None.as_str().to_string(),
            shuffle: false,
            poll_interval_ms: 100,
        }
    }
}

impl PlayerConfig {
    pub fn bus_name(&self) -> String {
        format!("org.mpris.MediaPlayer2.{}", self.bus_suffix)
    }

    /// Session options, with command line overrides applied.
    pub fn session_options(
        &self,
        loop_status: Option<LoopStatus>,
        shuffle: bool,
    ) -> Result<SessionOptions, PlayerError> {
        let loop_status = match loop_status {
            Some(status) => status,
            None => self.loop_status.parse()?,
        };
        Ok(SessionOptions {
            loop_status,
            shuffle: shuffle || self.shuffle,
            volume: self.volume.max(0.0),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        })
    }
}

/// Speech provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub api_base: String,

    /// Provider voice identifier (required for generation)
    pub voice_id: String,

    /// Display name of the voice; its first word becomes the clip artist
    pub voice_name: String,

    pub model_id: String,

    /// Voice stability in percent
    pub stability: u8,

    /// Similarity boost in percent
    pub similarity_boost: u8,

    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.elevenlabs.io/v1".to_string(),
            voice_id: String::new(),
            voice_name: "ElevenLabs".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            stability: 50,
            similarity_boost: 75,
            timeout_secs: 30,
        }
    }
}

/// Clip cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// History rows kept when not unlimited
    pub max_history: u32,

    pub unlimited: bool,

    /// Clip directory (default: `<cache_dir>/elevenlabs-tts`)
    pub dir: Option<PathBuf>,

    /// Database file (default: `<data_dir>/elevenlabs-tts/tts.db`)
    pub database: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            unlimited: false,
            dir: None,
            database: None,
        }
    }
}

impl CacheConfig {
    pub fn retention(&self) -> Retention {
        if self.unlimited {
            Retention::Unlimited
        } else {
            Retention::Keep(self.max_history)
        }
    }

    pub fn clip_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR)
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR)
                .join("tts.db")
        })
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR))
}

/// Get the full path to the default config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from `path`, or from the default location.
///
/// Returns default config if the file doesn't exist or can't be parsed.
pub fn load(path: Option<&Path>) -> Config {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match config_path() {
            Some(p) => p,
            None => {
                tracing::warn!(target: "config", "Could not determine config directory, using defaults");
                return Config::default();
            }
        },
    };
    load_from(&path)
}

pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!(target: "config", path = %path.display(), "No config file found, using defaults");
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!(target: "config", path = %path.display(), "Loaded config");
                config
            }
            Err(e) => {
                tracing::error!(target: "config", path = %path.display(), error = %e, "Failed to parse config file");
                tracing::warn!(target: "config", "Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!(target: "config", path = %path.display(), error = %e, "Failed to read config file");
            Config::default()
        }
    }
}

/// Save configuration to the default location.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to `path`, creating parent directories.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!(target: "config", path = %path.display(), "Saved config");
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
