//! Email cache data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An email stored in the cache.
///
/// Display fields are denormalized so list views never need a join; thread and
/// folder membership are plain string references to remote identifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedEmail {
    /// Stable remote identifier.
    pub id: String,
    /// Thread this message belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thread_id: String,
    /// Folder this message lives in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub folder_id: String,
    /// Message subject.
    pub subject: String,
    /// Preview text.
    pub snippet: String,
    /// Sender display name.
    pub from_name: String,
    /// Sender address.
    pub from_email: String,
    /// Recipient addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,
    /// CC addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    /// BCC addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
    /// Message date.
    pub date: DateTime<Utc>,
    /// Whether the message is unread.
    pub unread: bool,
    /// Whether the message is starred.
    pub starred: bool,
    /// Whether the message has attachments.
    pub has_attachments: bool,
    /// HTML body, if fetched.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body_html: String,
    /// Plain text body, if fetched.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body_text: String,
    /// When the message was written to the cache. Set on every write.
    pub cached_at: DateTime<Utc>,
}

/// Filters and pagination for email listing.
#[derive(Debug, Clone, Default)]
pub struct EmailListOptions {
    /// Restrict to a folder.
    pub folder_id: Option<String>,
    /// Restrict to a thread.
    pub thread_id: Option<String>,
    /// Only unread messages.
    pub unread_only: bool,
    /// Only starred messages.
    pub starred_only: bool,
    /// Only messages dated at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only messages dated strictly before this instant.
    pub before: Option<DateTime<Utc>>,
    /// Maximum rows returned; unlimited when `None`.
    pub limit: Option<u32>,
    /// Rows to skip.
    pub offset: Option<u32>,
}
