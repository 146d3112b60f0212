//! Sync state data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sync progress for one resource kind (emails, events, contacts, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// Resource kind this row tracks.
    pub resource: String,
    /// When the resource last synced successfully.
    pub last_sync: Option<DateTime<Utc>>,
    /// Opaque provider cursor for incremental sync.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cursor: String,
    /// Free-form metadata, JSON-encoded by the sync layer.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
}
