// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Provides sensible defaults if the config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::file::{read_entire_file, FileMode};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan window".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Only honoured in builds with debug assertions
    pub validation_layers: bool,
    pub log_level: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
            show_fps: false,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        // Read failures are logged by the loader and come back empty
        let bytes = read_entire_file(path, FileMode::Text);
        if bytes.is_empty() {
            log::warn!("Config file {:?} is empty or unreadable, using defaults", path);
            return Ok(Config::default());
        }

        let content = String::from_utf8(bytes)
            .with_context(|| format!("Config file is not valid UTF-8: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Validation and diagnostics need both a debug build and the config switch
    pub fn debug_output_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown log level '{}', defaulting to info", self.debug.log_level);
            log::LevelFilter::Info
        })
    }
}
