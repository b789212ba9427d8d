//! Conversation model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user's chat thread with cached message/token/cost counters
///
/// `settings` is a JSON document merged over system defaults at read time by
/// the chat layer; the row itself stores only what the user overrode.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    /// Unique identifier (UUID string)
    pub id: String,

    /// Owning user
    pub user_id: String,

    /// Auto-generated from the first user message when absent
    pub title: Option<String>,

    /// Preferred model row id; falls back to the system default when absent
    pub model_id: Option<String>,

    /// JSON settings overrides
    pub settings: String,

    pub message_count: i64,
    pub total_tokens: i64,
    pub total_cost: f64,

    pub last_message_at: Option<String>,
    pub is_archived: bool,

    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    pub fn new(id: String, user_id: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            user_id,
            title: None,
            model_id: None,
            settings: "{}".to_string(),
            message_count: 0,
            total_tokens: 0,
            total_cost: 0.0,
            last_message_at: None,
            is_archived: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_settings(mut self, settings: impl Into<String>) -> Self {
        self.settings = settings.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_creation() {
        let conversation = Conversation::new("conv-1".to_string(), "user-1".to_string());

        assert_eq!(conversation.id, "conv-1");
        assert_eq!(conversation.user_id, "user-1");
        assert!(conversation.title.is_none());
        assert_eq!(conversation.settings, "{}");
        assert_eq!(conversation.message_count, 0);
        assert!(!conversation.is_archived);
    }

    #[test]
    fn test_conversation_builders() {
        let conversation = Conversation::new("conv-1".to_string(), "user-1".to_string())
            .with_title("Trip planning")
            .with_model("model-1")
            .with_settings(r#"{"temperature": 0.2}"#);

        assert_eq!(conversation.title, Some("Trip planning".to_string()));
        assert_eq!(conversation.model_id, Some("model-1".to_string()));
        assert_eq!(conversation.settings, r#"{"temperature": 0.2}"#);
    }
}
