//! Calendar cache data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar stored in the cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedCalendar {
    /// Stable remote identifier.
    pub id: String,
    /// Calendar display name.
    pub name: String,
    /// Calendar description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Whether this is the account's primary calendar.
    pub is_primary: bool,
    /// Whether the calendar is read-only for this account.
    pub read_only: bool,
    /// Display color as a hex string.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hex_color: String,
    /// When the calendar was written to the cache. Set on every write.
    pub cached_at: DateTime<Utc>,
}
