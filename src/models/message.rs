use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::SenderProfile;

/// Reference to a file uploaded elsewhere; only the metadata is stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub name: String,
    pub mime_type: String,
}

/// Team chat message. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub team_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub text: String,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub team_id: String,
    pub sender_id: String,
    pub text: String,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    pub sender: Option<SenderProfile>,
}

impl From<&Message> for MessageView {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            team_id: msg.team_id.clone(),
            sender_id: msg.sender_id.clone(),
            text: msg.text.clone(),
            attachment: msg.attachment.clone(),
            created_at: msg.created_at,
            sender: None,
        }
    }
}
