//! Folder cache data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mail folder stored in the cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedFolder {
    /// Stable remote identifier.
    pub id: String,
    /// Folder display name.
    pub name: String,
    /// Provider folder type (inbox, sent, trash, ...).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub folder_type: String,
    /// Unread message count at last sync.
    pub unread_count: i64,
    /// Total message count at last sync.
    pub total_count: i64,
    /// When the folder was written to the cache. Set on every write.
    pub cached_at: DateTime<Utc>,
}
