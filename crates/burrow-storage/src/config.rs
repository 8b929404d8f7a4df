//! Storage layer configuration.

use crate::error::StorageError;
use crate::inventory::InventoryConfig;
use serde::{Deserialize, Serialize};

/// Tunables for the storage registry and its stores. All fields have
/// defaults so a partial config file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Period of the expired-entry sweep across all stores.
    pub prune_interval_secs: u64,
    /// Quiet window the persistence flusher waits for after a mutation
    /// before writing a snapshot.
    pub flush_debounce_ms: u64,
    /// Caps applied to inventory responses.
    pub inventory: InventoryConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prune_interval_secs: 60,
            flush_debounce_ms: 500,
            inventory: InventoryConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Parse from TOML, filling unnamed fields with defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, StorageError> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.prune_interval_secs, 60);
        assert_eq!(config.flush_debounce_ms, 500);
        assert_eq!(config.inventory.max_entries, 5000);
        assert_eq!(config.inventory.max_accumulated_bytes, 2_000_000);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = StorageConfig::from_toml_str(
            r#"
            prune_interval_secs = 30

            [inventory]
            max_entries = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.prune_interval_secs, 30);
        assert_eq!(config.flush_debounce_ms, 500);
        assert_eq!(config.inventory.max_entries, 100);
        assert_eq!(config.inventory.max_accumulated_bytes, 2_000_000);
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(StorageConfig::from_toml_str("prune_interval_secs = []").is_err());
    }
}
