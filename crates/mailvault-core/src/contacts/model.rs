//! Contact cache data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contact stored in the cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedContact {
    /// Stable remote identifier.
    pub id: String,
    /// Given name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub given_name: String,
    /// Surname.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub surname: String,
    /// Display name, preferred over the name parts when present.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    /// Primary email address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    /// Phone number.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone: String,
    /// Company name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub company: String,
    /// Job title.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub job_title: String,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
    /// Remote photo URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub photo_url: String,
    /// Group memberships.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    /// When the contact was written to the cache. Set on every write.
    pub cached_at: DateTime<Utc>,
}

impl CachedContact {
    /// Best display name: explicit display name, else "given surname".
    #[must_use]
    pub fn name(&self) -> String {
        if self.display_name.is_empty() {
            format!("{} {}", self.given_name, self.surname)
                .trim()
                .to_string()
        } else {
            self.display_name.clone()
        }
    }
}

/// Filters and pagination for contact listing.
#[derive(Debug, Clone, Default)]
pub struct ContactListOptions {
    /// Restrict to members of a group.
    pub group: Option<String>,
    /// Maximum rows returned; unlimited when `None`.
    pub limit: Option<u32>,
    /// Rows to skip.
    pub offset: Option<u32>,
}
