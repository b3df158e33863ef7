//! Bridge configuration.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! `NGX_` prefixed environment variables (nested keys separated by `__`,
//! e.g. `NGX_KEYS__RULES=rules_v2`).

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Storage keys of the persisted collections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    /// JSON array of rules
    pub rules: String,
    /// Map of profile id -> profile
    pub profiles: String,
    /// Map of group name -> group
    pub groups: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            rules: "rules".to_string(),
            profiles: "extensionManagerProfiles_v2".to_string(),
            groups: "extensionManagerGroups_v4".to_string(),
        }
    }
}

/// Configuration for the storage bridge and its worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// SQLite database holding the key-value table
    pub storage_path: PathBuf,
    pub keys: StorageKeys,
    /// Id of the manager extension itself, hidden from the catalog
    pub host_extension_id: Option<String>,
    /// Pending requests the worker queue holds before senders wait
    pub channel_capacity: usize,
    /// How long a caller waits for the worker to answer
    pub request_timeout_ms: u64,
    /// Largest serialized value a single key may hold
    pub quota_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./var/data/extension_manager.db"),
            keys: StorageKeys::default(),
            host_extension_id: None,
            channel_capacity: 32,
            request_timeout_ms: 5_000,
            quota_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Storage key for {0} cannot be empty")]
    EmptyKey(&'static str),

    #[error("Storage keys must be distinct")]
    DuplicateKeys,

    #[error("Invalid channel_capacity: {0}. Must be at least 1")]
    InvalidChannelCapacity(usize),

    #[error("Invalid request_timeout_ms: {0}. Must be at least 1")]
    InvalidTimeout(u64),

    #[error("Invalid quota_bytes: {0}. Must be at least 1")]
    InvalidQuota(usize),
}

impl BridgeConfig {
    /// Defaults merged with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::extract(Self::base().merge(Self::env()))
    }

    /// Defaults, then `path`, then environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::extract(Self::base().merge(Json::file(path.as_ref())).merge(Self::env()))
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(BridgeConfig::default()))
    }

    fn env() -> Env {
        Env::prefixed("NGX_").split("__")
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: BridgeConfig = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let keys = &self.keys;
        for (label, key) in [
            ("rules", &keys.rules),
            ("profiles", &keys.profiles),
            ("groups", &keys.groups),
        ] {
            if key.trim().is_empty() {
                return Err(ConfigError::EmptyKey(label));
            }
        }
        if keys.rules == keys.profiles
            || keys.rules == keys.groups
            || keys.profiles == keys.groups
        {
            return Err(ConfigError::DuplicateKeys);
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity(self.channel_capacity));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(self.request_timeout_ms));
        }
        if self.quota_bytes == 0 {
            return Err(ConfigError::InvalidQuota(self.quota_bytes));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
