//! Usage log model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One model-gateway call, success or failure
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageLog {
    /// Unique identifier (UUID string)
    pub id: String,

    pub user_id: String,
    pub model_id: String,

    pub conversation_id: Option<String>,

    /// Correlates the log row with the returned outcome
    pub request_id: String,

    /// One of: chat, chat_stream, workflow
    pub operation: String,

    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost: f64,
    pub response_time_ms: i64,

    pub success: bool,
    pub error_message: Option<String>,

    pub created_at: String,
}

impl UsageLog {
    pub fn new(
        id: String,
        user_id: String,
        model_id: String,
        request_id: String,
        operation: String,
    ) -> Self {
        Self {
            id,
            user_id,
            model_id,
            conversation_id: None,
            request_id,
            operation,
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
            response_time_ms: 0,
            success: true,
            error_message: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_usage(mut self, input_tokens: i64, output_tokens: i64, cost: f64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self.cost = cost;
        self
    }

    pub fn with_response_time(mut self, response_time_ms: i64) -> Self {
        self.response_time_ms = response_time_ms;
        self
    }

    pub fn failed(mut self, error_message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error_message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_log_defaults_to_success() {
        let log = UsageLog::new(
            "log-1".to_string(),
            "user-1".to_string(),
            "model-1".to_string(),
            "req-1".to_string(),
            "chat".to_string(),
        );

        assert!(log.success);
        assert!(log.error_message.is_none());
        assert!(log.conversation_id.is_none());
    }

    #[test]
    fn test_failed_builder() {
        let log = UsageLog::new(
            "log-1".to_string(),
            "user-1".to_string(),
            "model-1".to_string(),
            "req-1".to_string(),
            "chat_stream".to_string(),
        )
        .failed("provider unavailable");

        assert!(!log.success);
        assert_eq!(log.error_message, Some("provider unavailable".to_string()));
    }
}
