//! Extension configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the preference database
    pub database_path: PathBuf,
    /// Prefix of the extension's own preferences
    pub preference_branch: String,
    /// Whitelist preference name, relative to `preference_branch`
    pub whitelist_key: String,
    /// Global script switch, saved at startup and restored at shutdown
    pub scripts_enabled_key: String,
    /// Default log filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            database_path: data_dir.join("prefs.db"),
            preference_branch: "extensions.descript.".to_string(),
            whitelist_key: "whitelist".to_string(),
            scripts_enabled_key: "javascript.enabled".to_string(),
            log_filter: "info".to_string(),
        }
    }

    /// Read a JSON config file; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.whitelist_key.trim().is_empty() {
            return Err(CoreError::Config("whitelist_key is empty".to_string()));
        }
        if self.scripts_enabled_key.trim().is_empty() {
            return Err(CoreError::Config("scripts_enabled_key is empty".to_string()));
        }
        if self.whitelist_preference() == self.scripts_enabled_key {
            return Err(CoreError::Config(
                "whitelist and scripts-enabled preferences collide".to_string(),
            ));
        }
        Ok(())
    }

    /// Fully-qualified whitelist preference name
    pub fn whitelist_preference(&self) -> String {
        format!("{}{}", self.preference_branch, self.whitelist_key)
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("descript"))
            .unwrap_or_else(|| PathBuf::from(".descript"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}
