//! Persistent application configuration
//!
//! Stores the timer trigger, inspection setting, Stackmat input device and
//! current category in a JSON file at `<data_dir>/cubetimer/config.json`.

use cubetimer_core::TimerId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_sample_rate() -> u32 {
    cubetimer_core::DEFAULT_SAMPLE_RATE
}

fn default_category() -> String {
    "3x3x3".to_string()
}

/// Persistent application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Timer source used at startup
    #[serde(default)]
    pub timer_trigger: TimerId,
    /// Whether solves start with a 15 second inspection
    #[serde(default)]
    pub inspection_enabled: bool,
    /// Stackmat line-in device name (None = default input)
    #[serde(default)]
    pub stackmat_device: Option<String>,
    /// Line-in sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Category new solutions are recorded under
    #[serde(default = "default_category")]
    pub category: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timer_trigger: TimerId::default(),
            inspection_enabled: false,
            stackmat_device: None,
            sample_rate: default_sample_rate(),
            category: default_category(),
        }
    }
}

/// Application data directory: `<data_dir>/cubetimer`
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cubetimer")
}

impl AppConfig {
    /// Config file path: `<data_dir>/cubetimer/config.json`
    pub fn path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Solutions log path: `<data_dir>/cubetimer/solutions.jsonl`
    pub fn solutions_path() -> PathBuf {
        data_dir().join("solutions.jsonl")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from disk, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }
}
