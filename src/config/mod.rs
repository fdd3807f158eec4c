//! Configuration module for rivulet
//!
//! An [`EngineConfig`] describes how an [`Engine`](crate::runtime::Engine)
//! builds its schedulers, which backpressure policy the demo pipelines use and
//! how the binary sets up logging.
//!
//! # Config Location
//!
//! The default file lives in the platform-appropriate config directory:
//! - **Linux**: `~/.config/dev.hxyulin.rivulet/rivulet.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.rivulet/rivulet.toml`
//! - **Windows**: `%APPDATA%\dev.hxyulin.rivulet\rivulet.toml`
//!
//! # Example
//!
//! ```ignore
//! use rivulet::config::EngineConfig;
//!
//! let config = EngineConfig::load("rivulet.toml")?;
//! config.validate()?;
//! let engine = rivulet::runtime::Engine::new(config)?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, ResultExt, RivuletError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.hxyulin.rivulet";

/// Default config filename
pub const CONFIG_FILE: &str = "rivulet.toml";

// ==================== Config Directory ====================

/// Get the directory holding the default config file
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Engine Config ====================

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Version for future migration support
    pub version: u32,

    /// Scheduler and boundary tuning
    pub scheduler: SchedulerSettings,

    /// Default policy handed out by `Engine::backpressure`
    pub backpressure: BackpressurePolicy,

    /// Logging setup for the binary
    pub logging: LoggingSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            scheduler: SchedulerSettings::default(),
            backpressure: BackpressurePolicy::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load a config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            RivuletError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load engine config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| RivuletError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Reject settings no scheduler or stage can work with
    pub fn validate(&self) -> Result<()> {
        let scheduler = &self.scheduler;
        if scheduler.pool_max_threads == 0 {
            return Err(RivuletError::Config(
                "scheduler.pool_max_threads must be at least 1".to_string(),
            ));
        }
        if scheduler.prefetch == 0 {
            return Err(RivuletError::Config(
                "scheduler.prefetch must be at least 1".to_string(),
            ));
        }
        if scheduler.drain_batch == 0 {
            return Err(RivuletError::Config(
                "scheduler.drain_batch must be at least 1".to_string(),
            ));
        }
        if scheduler.pool_name.is_empty() {
            return Err(RivuletError::Config(
                "scheduler.pool_name must not be empty".to_string(),
            ));
        }
        if self.backpressure.capacity() == Some(0) {
            return Err(RivuletError::Config(
                "backpressure.capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
