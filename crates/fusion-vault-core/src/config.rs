//! Application configuration management.
//!
//! Holds the storage key names the vault reads and writes, the default
//! display name and an optional data directory override.
//!
//! Configuration is stored at `~/.config/fusion-vault/config.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "fusion-vault";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Display name used until the user sets one
pub const DEFAULT_USER: &str = "Guest";

/// Storage keys shared with the other widget subsystems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    /// Vault envelope (plaintext or encrypted)
    pub envelope: String,
    /// Active API token, read by the chat collaborator
    pub active_token: String,
    /// Display name, read by the UI
    pub user_name: String,
    /// Module (stack) list
    pub modules: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            envelope: "fusion_os_data_v9".to_string(),
            active_token: "di_apiKey".to_string(),
            user_name: "di_userName".to_string(),
            modules: "dual_vault_data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub default_user: String,
    pub storage_keys: StorageKeys,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_user: DEFAULT_USER.to_string(),
            storage_keys: StorageKeys::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where the file store lives: the configured override, else the
    /// platform data directory.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
