//! Memory model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A typed, scored fact remembered about a user
///
/// Uniqueness is (user_id, memory_type, key, context); a missing context is
/// stored as the empty string so the constraint stays total. `value` is plain
/// text; [`Memory::decoded_value`] re-reads it as JSON when it looks
/// JSON-shaped.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Memory {
    /// Unique identifier (UUID string)
    pub id: String,

    pub user_id: String,

    /// One of: short_term, long_term, working, meta
    pub memory_type: String,

    pub key: String,
    pub value: String,

    /// Scope qualifier; empty string means unscoped
    pub context: String,

    /// Optional JSON annotations
    pub metadata: Option<String>,

    pub importance_score: i64,

    pub access_count: i64,
    pub last_accessed_at: String,

    /// RFC 3339 expiry; None never expires
    pub expires_at: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

impl Memory {
    pub fn new(id: String, user_id: String, memory_type: String, key: String, value: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            user_id,
            memory_type,
            key,
            value,
            context: String::new(),
            metadata: None,
            importance_score: 1,
            access_count: 1,
            last_accessed_at: now.clone(),
            expires_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn with_importance(mut self, importance_score: i64) -> Self {
        self.importance_score = importance_score;
        self
    }

    pub fn with_expiry(mut self, expires_at: impl Into<String>) -> Self {
        self.expires_at = Some(expires_at.into());
        self
    }

    /// True when `expires_at` is set and in the past
    pub fn is_expired(&self) -> bool {
        match &self.expires_at {
            Some(at) => match chrono::DateTime::parse_from_rfc3339(at) {
                Ok(at) => at < chrono::Utc::now(),
                Err(_) => false,
            },
            None => false,
        }
    }

    /// Value decoded as JSON when it starts with `{` or `[`, else a string
    pub fn decoded_value(&self) -> serde_json::Value {
        let trimmed = self.value.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            serde_json::from_str(&self.value)
                .unwrap_or_else(|_| serde_json::Value::String(self.value.clone()))
        } else {
            serde_json::Value::String(self.value.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(value: &str) -> Memory {
        Memory::new(
            "mem-1".to_string(),
            "user-1".to_string(),
            "long_term".to_string(),
            "favorite_color".to_string(),
            value.to_string(),
        )
    }

    #[test]
    fn test_memory_defaults() {
        let memory = memory("blue");

        assert_eq!(memory.context, "");
        assert_eq!(memory.importance_score, 1);
        assert_eq!(memory.access_count, 1);
        assert!(memory.expires_at.is_none());
        assert!(!memory.is_expired());
    }

    #[test]
    fn test_is_expired() {
        let past = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        let future = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();

        assert!(memory("blue").with_expiry(past).is_expired());
        assert!(!memory("blue").with_expiry(future).is_expired());
    }

    #[test]
    fn test_decoded_value_json_object() {
        let memory = memory(r#"{"color": "blue"}"#);

        assert_eq!(
            memory.decoded_value(),
            serde_json::json!({"color": "blue"})
        );
    }

    #[test]
    fn test_decoded_value_plain_string() {
        let memory = memory("blue");

        assert_eq!(memory.decoded_value(), serde_json::json!("blue"));
    }

    #[test]
    fn test_decoded_value_invalid_json_falls_back_to_string() {
        let memory = memory("{not json");

        assert_eq!(memory.decoded_value(), serde_json::json!("{not json"));
    }
}
