//! Knowledge base model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user's document collection with its chunking and retrieval configuration
///
/// `vector_backend` and `embedding_model` are selector strings resolved against
/// the backend registry and embedding-model table at run time, so switching
/// either is pure configuration. The chunk geometry invariant
/// `0 < chunk_overlap < chunk_size` is enforced at create/update and mirrored
/// by a CHECK constraint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KnowledgeBase {
    /// Unique identifier (UUID string)
    pub id: String,

    /// Owning user
    pub user_id: String,

    pub name: String,
    pub description: Option<String>,

    /// Public rows are readable by any user; writes stay owner-only
    pub is_public: bool,

    /// Backend registry key, e.g. "memory"
    pub vector_backend: String,

    /// Embedding model name, e.g. "text-embedding-ada-002"
    pub embedding_model: String,

    /// Window length in characters
    pub chunk_size: i64,

    /// Characters shared between consecutive windows
    pub chunk_overlap: i64,

    /// JSON retrieval settings overrides
    pub settings: String,

    pub document_count: i64,
    pub chunk_count: i64,
    pub total_tokens: i64,

    pub created_at: String,
    pub updated_at: String,
}

impl KnowledgeBase {
    pub fn new(id: String, user_id: String, name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            user_id,
            name,
            description: None,
            is_public: false,
            vector_backend: "memory".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            settings: "{}".to_string(),
            document_count: 0,
            chunk_count: 0,
            total_tokens: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_backend(mut self, vector_backend: impl Into<String>) -> Self {
        self.vector_backend = vector_backend.into();
        self
    }

    pub fn with_embedding_model(mut self, embedding_model: impl Into<String>) -> Self {
        self.embedding_model = embedding_model.into();
        self
    }

    pub fn with_chunking(mut self, chunk_size: i64, chunk_overlap: i64) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn with_settings(mut self, settings: impl Into<String>) -> Self {
        self.settings = settings.into();
        self
    }

    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knowledge_base_defaults() {
        let kb = KnowledgeBase::new(
            "kb-1".to_string(),
            "user-1".to_string(),
            "Docs".to_string(),
        );

        assert_eq!(kb.vector_backend, "memory");
        assert_eq!(kb.embedding_model, "text-embedding-ada-002");
        assert_eq!(kb.chunk_size, 1000);
        assert_eq!(kb.chunk_overlap, 200);
        assert!(!kb.is_public);
    }

    #[test]
    fn test_knowledge_base_builders() {
        let kb = KnowledgeBase::new(
            "kb-1".to_string(),
            "user-1".to_string(),
            "Docs".to_string(),
        )
        .with_description("Product documentation")
        .with_chunking(500, 100)
        .public();

        assert_eq!(kb.description, Some("Product documentation".to_string()));
        assert_eq!(kb.chunk_size, 500);
        assert_eq!(kb.chunk_overlap, 100);
        assert!(kb.is_public);
    }
}
