//! Host configuration (`config.toml`)

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::LoadError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Root of the content; packages live in `<data_dir>/packages`
    pub data_dir: PathBuf,
    pub database_url: String,
    /// Length of one scheduler tick
    pub tick_millis: u64,
    /// How often queued progress updates are written
    pub autosave_secs: u64,
    pub listen_addr: String,
    pub default_conversation_io: String,
    /// Reload packages when files under the package directory change
    pub hot_reload: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_url: "sqlite:questline.db?mode=rwc".to_string(),
            tick_millis: 50, // 20 Hz
            autosave_secs: 30,
            listen_addr: "0.0.0.0:2567".to_string(),
            default_conversation_io: "simple".to_string(),
            hot_reload: cfg!(debug_assertions),
        }
    }
}

impl RuntimeConfig {
    /// Read the config file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            warn!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| LoadError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }
}
