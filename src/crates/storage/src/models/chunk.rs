//! Knowledge chunk model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One positioned window of a document's text
///
/// `start_position`/`end_position` are character offsets into the parsed
/// content; `vector_id` is set once the embedding is stored in the backend.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KnowledgeChunk {
    /// Unique identifier (UUID string)
    pub id: String,

    pub document_id: String,
    pub knowledge_base_id: String,

    /// Zero-based order within the document
    pub chunk_index: i64,

    pub content: String,

    pub start_position: i64,
    pub end_position: i64,

    /// Estimated tokens, ceil(chars / 4)
    pub token_count: i64,

    /// Backend-assigned vector identifier
    pub vector_id: Option<String>,

    pub embedding_cost: f64,

    pub created_at: String,
}

impl KnowledgeChunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        document_id: String,
        knowledge_base_id: String,
        chunk_index: i64,
        content: String,
        start_position: i64,
        end_position: i64,
        token_count: i64,
    ) -> Self {
        Self {
            id,
            document_id,
            knowledge_base_id,
            chunk_index,
            content,
            start_position,
            end_position,
            token_count,
            vector_id: None,
            embedding_cost: 0.0,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
