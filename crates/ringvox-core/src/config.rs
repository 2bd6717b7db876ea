//! Engine configuration.
//!
//! Settings load from TOML; every section and key is optional and falls back
//! to its default.
//!
//! ```toml
//! master_gain = 0.8
//! reference_distance = 128.0
//!
//! [ring]
//! buffers = 4
//! fragment_bytes = 65536
//!
//! [channels]
//! music = 0.5
//! ```
//!
//! The per-user file lives at [`user_config_path`]:
//!
//! - Linux: `~/.config/ringvox/config.toml`
//! - macOS: `~/Library/Application Support/ringvox/config.toml`
//! - Windows: `%APPDATA%\ringvox\config.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ChannelId, ConfigError};

/// Application name used for directory paths.
const APP_NAME: &str = "ringvox";

/// Configuration file name inside the application directory.
const CONFIG_FILE: &str = "config.toml";

/// Streaming ring geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Buffers cycled per streaming voice.
    pub buffers: usize,
    /// Bytes decoded per buffer refill, rounded down to whole frames.
    pub fragment_bytes: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            buffers: 4,
            fragment_bytes: 65536,
        }
    }
}

/// Initial gain of each channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelGains {
    /// Sound effects.
    pub sound: f32,
    /// Music.
    pub music: f32,
    /// Dialogue.
    pub voice: f32,
}

impl Default for ChannelGains {
    fn default() -> Self {
        Self {
            sound: 1.0,
            music: 1.0,
            voice: 1.0,
        }
    }
}

impl ChannelGains {
    /// Gain configured for `channel`.
    pub fn get(&self, channel: ChannelId) -> f32 {
        match channel {
            ChannelId::Sound => self.sound,
            ChannelId::Music => self.music,
            ChannelId::Voice => self.voice,
        }
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Listener (master) gain.
    pub master_gain: f32,
    /// Reference distance given to every new voice.
    pub reference_distance: f32,
    /// Rolloff factor given to every new voice.
    pub rolloff_factor: f32,
    /// Streaming ring geometry.
    pub ring: RingConfig,
    /// Initial channel gains.
    pub channels: ChannelGains,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            master_gain: 1.0,
            reference_distance: 128.0,
            rolloff_factor: 1.0,
            ring: RingConfig::default(),
            channels: ChannelGains::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load settings from `path`, or defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate settings from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Convert the settings to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save the settings to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring.buffers < 2 {
            return Err(ConfigError::invalid("ring.buffers", "must be at least 2"));
        }
        if self.ring.fragment_bytes < 256 {
            return Err(ConfigError::invalid(
                "ring.fragment_bytes",
                "must be at least 256",
            ));
        }
        let gains = [
            ("master_gain", self.master_gain),
            ("channels.sound", self.channels.sound),
            ("channels.music", self.channels.music),
            ("channels.voice", self.channels.voice),
        ];
        for (key, gain) in gains {
            if gain < 0.0 || !gain.is_finite() {
                return Err(ConfigError::invalid(key, format!("{gain} is not a gain")));
            }
        }
        if self.reference_distance <= 0.0 || self.reference_distance.is_nan() {
            return Err(ConfigError::invalid("reference_distance", "must be positive"));
        }
        Ok(())
    }
}

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the path of the per-user configuration file.
pub fn user_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_classic_ring() {
        let config = EngineConfig::default();
        assert_eq!(config.ring.buffers, 4);
        assert_eq!(config.ring.fragment_bytes, 65536);
        assert_eq!(config.reference_distance, 128.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml("[channels]\nmusic = 0.5\n").unwrap();
        assert_eq!(config.channels.music, 0.5);
        assert_eq!(config.channels.sound, 1.0);
        assert_eq!(config.ring, RingConfig::default());
        assert_eq!(config.channels.get(ChannelId::Music), 0.5);
    }

    #[test]
    fn tiny_ring_rejected() {
        let err = EngineConfig::from_toml("[ring]\nbuffers = 1\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "ring.buffers",
                ..
            }
        ));
    }

    #[test]
    fn negative_gain_rejected() {
        let err = EngineConfig::from_toml("master_gain = -1.0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "master_gain",
                ..
            }
        ));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = EngineConfig::from_toml("ring = 3").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn save_and_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = EngineConfig::default();
        config.master_gain = 0.25;
        config.ring.buffers = 8;
        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(matches!(
            EngineConfig::load(dir.path().join("absent.toml")),
            Err(ConfigError::ReadFile { .. })
        ));
    }

    #[test]
    fn user_config_path_ends_with_app_file() {
        let path = user_config_path();
        assert!(path.ends_with("ringvox/config.toml"));
    }
}
