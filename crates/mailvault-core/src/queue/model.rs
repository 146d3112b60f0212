//! Offline queue data model.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Kind of mutation queued while offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Mark an email read.
    MarkRead,
    /// Mark an email unread.
    MarkUnread,
    /// Star an email.
    Star,
    /// Remove the star from an email.
    Unstar,
    /// Archive an email.
    Archive,
    /// Delete an email.
    Delete,
    /// Move an email to another folder.
    Move,
    /// Send an email.
    Send,
    /// Save a draft.
    SaveDraft,
    /// Delete a draft.
    DeleteDraft,
    /// Create a calendar event.
    CreateEvent,
    /// Update a calendar event.
    UpdateEvent,
    /// Delete a calendar event.
    DeleteEvent,
    /// Create a contact.
    CreateContact,
    /// Update a contact.
    UpdateContact,
    /// Delete a contact.
    DeleteContact,
}

impl ActionType {
    /// Stable wire name, matching the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MarkRead => "mark_read",
            Self::MarkUnread => "mark_unread",
            Self::Star => "star",
            Self::Unstar => "unstar",
            Self::Archive => "archive",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Send => "send",
            Self::SaveDraft => "save_draft",
            Self::DeleteDraft => "delete_draft",
            Self::CreateEvent => "create_event",
            Self::UpdateEvent => "update_event",
            Self::DeleteEvent => "delete_event",
            Self::CreateContact => "create_contact",
            Self::UpdateContact => "update_contact",
            Self::DeleteContact => "delete_contact",
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "mark_read" => Self::MarkRead,
            "mark_unread" => Self::MarkUnread,
            "star" => Self::Star,
            "unstar" => Self::Unstar,
            "archive" => Self::Archive,
            "delete" => Self::Delete,
            "move" => Self::Move,
            "send" => Self::Send,
            "save_draft" => Self::SaveDraft,
            "delete_draft" => Self::DeleteDraft,
            "create_event" => Self::CreateEvent,
            "update_event" => Self::UpdateEvent,
            "delete_event" => Self::DeleteEvent,
            "create_contact" => Self::CreateContact,
            "update_contact" => Self::UpdateContact,
            "delete_contact" => Self::DeleteContact,
            other => {
                return Err(crate::Error::Config(format!(
                    "unknown queued action type: {other}"
                )));
            }
        })
    }
}

/// One queued mutation, replayed against the provider once connectivity
/// returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedAction {
    /// Queue row id, assigned on enqueue.
    pub id: i64,
    /// Kind of mutation.
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Id of the affected email, event, or contact.
    pub resource_id: String,
    /// JSON-encoded action payload.
    pub payload: String,
    /// When the action was queued.
    pub created_at: DateTime<Utc>,
    /// How many replay attempts have failed.
    pub attempts: i64,
    /// Message from the most recent failed attempt.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_error: String,
}

impl QueuedAction {
    /// Decodes the payload into a typed struct.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON for `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Payload for [`ActionType::MarkRead`] / [`ActionType::MarkUnread`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkReadPayload {
    /// Affected email.
    pub email_id: String,
    /// Desired unread state.
    pub unread: bool,
}

/// Payload for [`ActionType::Star`] / [`ActionType::Unstar`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarPayload {
    /// Affected email.
    pub email_id: String,
    /// Desired starred state.
    pub starred: bool,
}

/// Payload for [`ActionType::Move`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovePayload {
    /// Affected email.
    pub email_id: String,
    /// Destination folder.
    pub folder_id: String,
}

/// Payload for [`ActionType::Send`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailPayload {
    /// Primary recipients.
    pub to: Vec<String>,
    /// CC recipients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    /// BCC recipients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Message id being replied to, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reply_to: String,
}

/// Payload for [`ActionType::SaveDraft`] / [`ActionType::DeleteDraft`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftPayload {
    /// Existing draft id, empty for a new draft.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub draft_id: String,
    /// Primary recipients.
    pub to: Vec<String>,
    /// CC recipients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    /// BCC recipients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn action_type_serde_matches_wire_names() {
        for action in [
            ActionType::MarkRead,
            ActionType::Move,
            ActionType::SaveDraft,
            ActionType::DeleteContact,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
            let back: ActionType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, action);
        }
    }

    #[test]
    fn payload_decodes_into_typed_struct() {
        let action = QueuedAction {
            id: 1,
            action_type: ActionType::Move,
            resource_id: "e1".to_string(),
            payload: r#"{"email_id":"e1","folder_id":"archive"}"#.to_string(),
            created_at: Utc::now(),
            attempts: 0,
            last_error: String::new(),
        };
        let payload: MovePayload = action.payload_as().unwrap();
        assert_eq!(payload.folder_id, "archive");
        assert!(action.payload_as::<SendEmailPayload>().is_err());
    }
}
