//! Per-payload-class storage policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Entries beyond this count are rejected at add time.
pub const DEFAULT_MAX_MAP_SIZE: usize = 10_000;

/// Storage policy for one payload class.
///
/// Identifies the class by its store file name and fixes its expiry, size and
/// truncation-priority behavior. Immutable once constructed; compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaData {
    file_name: String,
    /// `None` means the class never expires.
    ttl: Option<Duration>,
    max_size_in_bytes: usize,
    /// Higher priority classes survive inventory truncation first.
    priority: u8,
    max_map_size: usize,
}

impl MetaData {
    /// Policy for a payload class stored under `file_name`.
    pub fn new(file_name: impl Into<String>, ttl: Option<Duration>, max_size_in_bytes: usize) -> Self {
        Self {
            file_name: file_name.into(),
            ttl,
            max_size_in_bytes,
            priority: 0,
            max_map_size: DEFAULT_MAX_MAP_SIZE,
        }
    }

    /// Same policy with an inventory priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Same policy with a store-entry cap.
    pub fn with_max_map_size(mut self, max_map_size: usize) -> Self {
        self.max_map_size = max_map_size;
        self
    }

    /// Store file name, also the registry store key.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Maximum entry age, `None` for no expiry.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Maximum serialized payload size accepted.
    pub fn max_size_in_bytes(&self) -> usize {
        self.max_size_in_bytes
    }

    /// Inventory truncation priority.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Maximum number of entries the owning store accepts.
    pub fn max_map_size(&self) -> usize {
        self.max_map_size
    }

    /// Whether an entry created at `created_at` (unix millis) has outlived its ttl.
    pub fn is_expired(&self, created_at: u64, now: u64) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_sub(created_at) > ttl.as_millis() as u64,
            None => false,
        }
    }
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_respects_ttl() {
        let meta = MetaData::new("offers", Some(Duration::from_secs(10)), 1024);
        assert!(!meta.is_expired(1_000, 10_000));
        assert!(!meta.is_expired(1_000, 11_000));
        assert!(meta.is_expired(1_000, 11_001));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let meta = MetaData::new("roles", None, 1024);
        assert!(!meta.is_expired(0, u64::MAX));
    }

    #[test]
    fn test_builder_overrides() {
        let meta = MetaData::new("chat", None, 512).with_priority(3).with_max_map_size(100);
        assert_eq!(meta.priority(), 3);
        assert_eq!(meta.max_map_size(), 100);
        assert_eq!(meta.file_name(), "chat");
    }
}
