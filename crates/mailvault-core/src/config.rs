//! Cache configuration.
//!
//! Settings are loaded and persisted by the surrounding application; this crate
//! only reads them, so the type here is a plain value with validation.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Minimum allowed cache size in megabytes.
const MIN_CACHE_SIZE_MB: u64 = 50;

/// Maximum allowed cache size in megabytes (10 GiB).
const MAX_CACHE_SIZE_MB: u64 = 10_000;

/// Cache behavior configuration, one instance per process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Whether caching is enabled at all.
    #[serde(rename = "cache_enabled")]
    pub enabled: bool,
    /// Maximum total cache size in MB.
    #[serde(rename = "cache_max_size_mb")]
    pub max_size_mb: u64,
    /// How long cached items are kept, in days.
    #[serde(rename = "cache_ttl_days")]
    pub ttl_days: u32,
    /// Background sync frequency in minutes (consumed by the external scheduler).
    pub sync_interval_minutes: u32,
    /// Whether offline actions are queued while disconnected.
    pub offline_queue_enabled: bool,
    /// Whether store files are encrypted at rest.
    pub encryption_enabled: bool,
    /// Whether attachment content is cached locally.
    pub attachment_cache_enabled: bool,
    /// Maximum attachment cache size in MB.
    pub attachment_max_size_mb: u64,
    /// How many days of history the first sync pulls.
    pub initial_sync_days: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_mb: 500,
            ttl_days: 30,
            sync_interval_minutes: 5,
            offline_queue_enabled: true,
            encryption_enabled: false,
            attachment_cache_enabled: true,
            attachment_max_size_mb: 100,
            initial_sync_days: 30,
        }
    }
}

impl CacheSettings {
    /// Checks that all values are within their allowed ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.max_size_mb < MIN_CACHE_SIZE_MB {
            return Err(Error::Config(format!(
                "cache_max_size_mb must be at least {MIN_CACHE_SIZE_MB}"
            )));
        }
        if self.max_size_mb > MAX_CACHE_SIZE_MB {
            return Err(Error::Config(format!(
                "cache_max_size_mb must be at most {MAX_CACHE_SIZE_MB}"
            )));
        }
        if self.ttl_days == 0 {
            return Err(Error::Config("cache_ttl_days must be at least 1".into()));
        }
        if self.sync_interval_minutes == 0 {
            return Err(Error::Config(
                "sync_interval_minutes must be at least 1".into(),
            ));
        }
        if self.initial_sync_days == 0 {
            return Err(Error::Config("initial_sync_days must be at least 1".into()));
        }
        Ok(())
    }

    /// Returns the cache TTL as a duration.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days as u64 * 24 * 60 * 60)
    }

    /// Returns the sync interval as a duration.
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_minutes as u64 * 60)
    }

    /// Returns the maximum cache size in bytes.
    #[must_use]
    pub const fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }

    /// Returns the maximum attachment cache size in bytes.
    #[must_use]
    pub const fn attachment_max_size_bytes(&self) -> u64 {
        self.attachment_max_size_mb * 1024 * 1024
    }
}

/// Store manager configuration: where store files live and how big caches may grow.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the per-account store files and blob directories.
    pub base_path: PathBuf,
    /// Cache behavior settings.
    pub settings: CacheSettings,
}

impl StoreConfig {
    /// Creates a config rooted at the given directory with default settings.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            settings: CacheSettings::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        CacheSettings::default().validate().unwrap();
    }

    #[test]
    fn rejects_size_below_floor() {
        let settings = CacheSettings {
            max_size_mb: 10,
            ..CacheSettings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_zero_ttl() {
        let settings = CacheSettings {
            ttl_days: 0,
            ..CacheSettings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn duration_helpers() {
        let settings = CacheSettings::default();
        assert_eq!(settings.ttl(), Duration::from_secs(30 * 24 * 60 * 60));
        assert_eq!(settings.sync_interval(), Duration::from_secs(300));
        assert_eq!(settings.max_size_bytes(), 500 * 1024 * 1024);
    }
}
