//! Session cache configuration
//!
//! Persisted separately from session records, under its own storage key.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts;
use crate::platform::KeyValueStorage;

/// Tunables for the vault, autosave and progress channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    // === Vault ===
    /// Lifetime of a saved snapshot (ms)
    pub ttl_ms: u64,
    /// Storage key prefix; each step's record lives at `<prefix>:<step id>`
    pub vault_key_prefix: String,

    // === Autosave ===
    /// Quiet period before a burst of edits is persisted (ms)
    pub debounce_ms: u64,
    /// How long the "just saved" indicator stays up (ms)
    pub saved_display_ms: u64,

    // === Progress ===
    /// Storage key of the progress map
    pub progress_key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: consts::DEFAULT_TTL_MS,
            vault_key_prefix: consts::VAULT_KEY_PREFIX.to_string(),

            debounce_ms: consts::DEBOUNCE_MS,
            saved_display_ms: consts::SAVED_DISPLAY_MS,

            progress_key: consts::PROGRESS_KEY.to_string(),
        }
    }
}

impl CacheConfig {
    /// Storage key for the config override itself
    const STORAGE_KEY: &'static str = "wizard_cache_config";

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Vault slot key for a step
    pub fn vault_key(&self, step_id: &str) -> String {
        format!("{}:{}", self.vault_key_prefix, step_id)
    }

    /// Parse a (possibly partial) JSON config; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load the stored override, falling back to defaults
    pub fn load(storage: &dyn KeyValueStorage) -> Self {
        if let Ok(Some(json)) = storage.get(Self::STORAGE_KEY) {
            match Self::from_json(&json) {
                Ok(config) => {
                    log::info!("Loaded session cache config from storage");
                    return config;
                }
                Err(err) => log::warn!("Ignoring unreadable session cache config: {err}"),
            }
        }

        log::info!("Using default session cache config");
        Self::default()
    }

    /// Persist this config as the override
    pub fn save(&self, storage: &dyn KeyValueStorage) {
        if let Ok(json) = serde_json::to_string(self) {
            match storage.set(Self::STORAGE_KEY, &json) {
                Ok(()) => log::info!("Session cache config saved"),
                Err(err) => log::warn!("Failed to save session cache config: {err}"),
            }
        }
    }
}
