use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One committed entry of the room log.
///
/// `id` and `created_at` are assigned by the backend; clients only ever
/// propose a [`MessageDraft`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub author_display_name: String,
    pub author_color: String,
    /// Server timestamp in milliseconds since the Unix epoch.
    pub created_at: i64,
    #[serde(default)]
    pub is_summary: bool,
}

impl Message {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at).single()
    }
}

/// Content proposed by a client for appending to the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub text: String,
    pub author_id: String,
    pub author_display_name: String,
    pub author_color: String,
    #[serde(default)]
    pub is_summary: bool,
}

impl MessageDraft {
    pub fn from_identity(identity: &Identity, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            author_id: identity.participant_id.clone(),
            author_display_name: identity.display_name.clone(),
            author_color: identity.avatar_color.clone(),
            is_summary: false,
        }
    }
}

/// Display identity of the local participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub display_name: String,
    pub avatar_color: String,
    /// Empty until anonymous sign-in resolves it.
    pub participant_id: String,
}
