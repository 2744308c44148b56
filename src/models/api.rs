use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chat::{ChatMessage, Conversation};

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: String,
    pub conversation_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub conversation_id: String,
    pub user_id: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationHistory {
    fn from(conversation: Conversation) -> Self {
        Self {
            conversation_id: conversation.id,
            user_id: conversation.user_id,
            messages: conversation.messages,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: "error".to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// One event of a streamed chat turn, serialized as the SSE `data:` payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Content {
        content: String,
    },
    Complete {
        conversation_id: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_event_wire_shape() {
        let content = StreamEvent::Content { content: "hi".into() };
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["type"], "content");
        assert_eq!(json["content"], "hi");

        let complete = StreamEvent::Complete {
            conversation_id: "c1".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&complete).unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["conversation_id"], "c1");
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn chat_request_without_conversation_id() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"message":"Hello","user_id":"u1"}"#).unwrap();
        assert_eq!(req.message, "Hello");
        assert!(req.conversation_id.is_none());
    }
}
