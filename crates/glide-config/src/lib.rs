//! Glide configuration system
//!
//! This crate provides centralized configuration management for Glide,
//! loading settings from `glide.toml` with environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration structure for Glide
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlideConfig {
    /// Exit coordination settings
    pub presence: PresenceConfig,
    /// Default transition used when a target declares none
    pub animation: AnimationConfig,
    /// Layout projection settings
    pub layout: LayoutConfig,
    /// Log filter settings
    pub logging: LoggingConfig,
}

/// Exit coordination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Upper bound on how long an exiting element is kept mounted (ms).
    /// Only a leak guard: normal exits settle when their animations finish.
    pub exit_timeout_ms: f64,
}

/// Default transition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Duration in milliseconds
    pub duration_ms: f32,
    /// Delay in milliseconds
    pub delay_ms: f32,
    /// Easing curve name (linear, ease, ease_in, ease_out, ease_in_out)
    pub easing: String,
}

/// Layout projection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Duration of layout animations in milliseconds
    pub duration_ms: f32,
    /// Easing curve name for layout animations
    pub easing: String,
    /// How many times frame work may re-queue itself within one tick
    pub max_frame_passes: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing-subscriber` env-filter directive
    pub filter: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            exit_timeout_ms: 3000.0,
        }
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            duration_ms: 300.0,
            delay_ms: 0.0,
            easing: "ease_out".to_string(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            duration_ms: 300.0,
            easing: "ease_out".to_string(),
            max_frame_passes: 8,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "glide=info,glide_motion=info".to_string(),
        }
    }
}

impl GlideConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration from the default location (glide.toml in the current directory)
    /// or return default configuration if file doesn't exist
    pub fn load_or_default() -> Self {
        Self::load_from_file("glide.toml").unwrap_or_default()
    }

    /// Merge configuration with environment variables
    ///
    /// Environment variables take precedence over configuration file values.
    pub fn merge_with_env(&mut self) {
        if let Ok(val) = std::env::var("GLIDE_EXIT_TIMEOUT_MS") {
            if let Ok(timeout) = val.parse::<f64>() {
                self.presence.exit_timeout_ms = timeout;
            }
        }
        if let Ok(val) = std::env::var("GLIDE_ANIMATION_DURATION_MS") {
            if let Ok(duration) = val.parse::<f32>() {
                self.animation.duration_ms = duration;
            }
        }
        if let Ok(val) = std::env::var("GLIDE_LAYOUT_DURATION_MS") {
            if let Ok(duration) = val.parse::<f32>() {
                self.layout.duration_ms = duration;
            }
        }
        if let Ok(filter) = std::env::var("GLIDE_LOG") {
            self.logging.filter = filter;
        }
    }

    /// Load configuration with environment variable overrides
    ///
    /// 1. Load from glide.toml (or use defaults if not found)
    /// 2. Override with environment variables if present
    pub fn load() -> Self {
        let mut config = Self::load_or_default();
        config.merge_with_env();
        config
    }
}
