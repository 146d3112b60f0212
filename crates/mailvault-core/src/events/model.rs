//! Event cache data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar event stored in the cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedEvent {
    /// Stable remote identifier.
    pub id: String,
    /// Calendar this event belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub calendar_id: String,
    /// Event title.
    pub title: String,
    /// Event description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Event location.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    /// Start of the event.
    pub start_time: DateTime<Utc>,
    /// End of the event.
    pub end_time: DateTime<Utc>,
    /// Whether the event spans whole days.
    pub all_day: bool,
    /// Whether the event recurs.
    pub recurring: bool,
    /// Recurrence rule, if recurring.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rrule: String,
    /// Participant addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<String>,
    /// Confirmation status.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Whether the event blocks availability.
    pub busy: bool,
    /// When the event was written to the cache. Set on every write.
    pub cached_at: DateTime<Utc>,
}

/// Filters and pagination for event listing.
#[derive(Debug, Clone, Default)]
pub struct EventListOptions {
    /// Restrict to a calendar.
    pub calendar_id: Option<String>,
    /// Only events ending at or after this instant.
    pub start: Option<DateTime<Utc>>,
    /// Only events starting at or before this instant.
    pub end: Option<DateTime<Utc>>,
    /// Maximum rows returned; unlimited when `None`.
    pub limit: Option<u32>,
    /// Rows to skip.
    pub offset: Option<u32>,
}
