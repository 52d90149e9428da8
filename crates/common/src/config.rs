//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{VidfeedError, VidfeedResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the local record store (feed posts, profiles, ...).
    pub store_dir: PathBuf,

    /// Render defaults.
    #[serde(default)]
    pub render: RenderConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Parameters shared by every render job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Output frame rate of the encoder.
    pub output_fps: u32,

    /// Surface width used when the source has not reported its dimensions.
    pub fallback_width: u32,

    /// Surface height used when the source has not reported its dimensions.
    pub fallback_height: u32,

    /// Mix bus / encoder audio sample rate.
    pub audio_sample_rate: u32,

    /// Mix bus / encoder channel count.
    pub audio_channels: u16,

    /// Fail a pass when no source event arrives for this long.
    /// `None` disables the watchdog.
    #[serde(default)]
    pub stall_timeout_secs: Option<f64>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vidfeed=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_dir: dirs_default_store(),
            render: RenderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_fps: 30,
            fallback_width: 1080,
            fallback_height: 1920,
            audio_sample_rate: 48000,
            audio_channels: 2,
            stall_timeout_secs: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl RenderConfig {
    /// Reject settings no encoder can honour.
    pub fn validate(&self) -> VidfeedResult<()> {
        if self.output_fps == 0 {
            return Err(VidfeedError::Config {
                message: "output_fps must be positive".to_string(),
            });
        }
        if self.fallback_width == 0 || self.fallback_height == 0 {
            return Err(VidfeedError::Config {
                message: format!(
                    "invalid fallback surface {}x{}",
                    self.fallback_width, self.fallback_height
                ),
            });
        }
        if self.audio_sample_rate == 0 || self.audio_channels == 0 {
            return Err(VidfeedError::Config {
                message: "audio sample rate and channel count must be positive".to_string(),
            });
        }
        if let Some(timeout) = self.stall_timeout_secs {
            if !(timeout.is_finite() && timeout > 0.0) {
                return Err(VidfeedError::Config {
                    message: format!("invalid stall timeout {timeout}"),
                });
            }
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
                    Ok(config) => match config.render.validate() {
                        Ok(()) => return config,
                        Err(e) => {
                            tracing::warn!("Ignoring config at {:?}: {}", config_path, e);
                        }
                    },
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("vidfeed").join("config.json")
}

/// Default record store directory.
fn dirs_default_store() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("vidfeed").join("store")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_render_config_is_valid_portrait() {
        let config = RenderConfig::default();
        config.validate().unwrap();
        assert_eq!((config.fallback_width, config.fallback_height), (1080, 1920));
        assert!(config.stall_timeout_secs.is_none());
    }

    #[test]
    fn rejects_zero_fps_and_bad_timeout() {
        let mut config = RenderConfig {
            output_fps: 0,
            ..RenderConfig::default()
        };
        assert!(config.validate().is_err());

        config.output_fps = 30;
        config.stall_timeout_secs = Some(-1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_config_files_fill_defaults() {
        let parsed: AppConfig = serde_json::from_str(r#"{"store_dir": "/tmp/vf"}"#).unwrap();
        assert_eq!(parsed.store_dir, PathBuf::from("/tmp/vf"));
        assert_eq!(parsed.render.output_fps, 30);
        assert_eq!(parsed.logging.level, "info");
    }
}
