//! Conversation message model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One message in a conversation
///
/// Ordering within a conversation is (created_at, rowid) so messages written
/// in the same instant keep their insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversationMessage {
    /// Unique identifier (UUID string)
    pub id: String,

    pub conversation_id: String,

    /// One of: system, user, assistant
    pub role: String,

    pub content: String,

    /// Model that produced an assistant message
    pub model_id: Option<String>,

    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost: f64,

    /// Wall-clock latency of the model call, assistant messages only
    pub latency_ms: Option<i64>,

    pub created_at: String,
}

impl ConversationMessage {
    pub fn new(id: String, conversation_id: String, role: String, content: String) -> Self {
        Self {
            id,
            conversation_id,
            role,
            content,
            model_id: None,
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
            latency_ms: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_usage(mut self, input_tokens: i64, output_tokens: i64, cost: f64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self.cost = cost;
        self
    }

    pub fn with_latency(mut self, latency_ms: i64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn is_user(&self) -> bool {
        self.role == "user"
    }

    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }

    pub fn is_system(&self) -> bool {
        self.role == "system"
    }

    pub fn total_tokens(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let message = ConversationMessage::new(
            "msg-1".to_string(),
            "conv-1".to_string(),
            "user".to_string(),
            "Hello".to_string(),
        );

        assert!(message.is_user());
        assert!(!message.is_assistant());
        assert_eq!(message.total_tokens(), 0);
    }

    #[test]
    fn test_message_with_usage() {
        let message = ConversationMessage::new(
            "msg-1".to_string(),
            "conv-1".to_string(),
            "assistant".to_string(),
            "Hi there".to_string(),
        )
        .with_model("model-1")
        .with_usage(12, 8, 0.00004)
        .with_latency(420);

        assert!(message.is_assistant());
        assert_eq!(message.total_tokens(), 20);
        assert_eq!(message.latency_ms, Some(420));
    }
}
