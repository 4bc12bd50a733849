use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Narration emitted by the engine for the chat layer to post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMessage {
    pub message_id: String,
    pub game_id: String,
    /// `None` for public narration, otherwise the only player who may see it.
    pub recipient: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl SystemMessage {
    pub fn public(game_id: &str, content: String, timestamp: DateTime<Utc>) -> Self {
        SystemMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            game_id: game_id.to_string(),
            recipient: None,
            content,
            timestamp,
        }
    }

    pub fn private(
        game_id: &str,
        recipient: &str,
        content: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        SystemMessage {
            recipient: Some(recipient.to_string()),
            ..SystemMessage::public(game_id, content, timestamp)
        }
    }

    pub fn is_public(&self) -> bool {
        self.recipient.is_none()
    }
}
