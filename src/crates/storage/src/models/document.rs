//! Knowledge document model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An ingested file inside a knowledge base
///
/// Lifecycle: pending -> processing -> completed | failed. A failed document
/// carries `error_message` and never reports chunk counts; `content` holds the
/// parsed text once processing completes. `content_hash` is the SHA-256 of the
/// raw bytes and is unique per knowledge base to reject duplicate uploads.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KnowledgeDocument {
    /// Unique identifier (UUID string)
    pub id: String,

    pub knowledge_base_id: String,

    pub filename: String,

    /// Lowercased file extension, e.g. "md"
    pub file_type: String,

    /// Raw size in bytes
    pub file_size: i64,

    /// Location in the file store
    pub file_path: String,

    /// SHA-256 hex digest of the raw bytes
    pub content_hash: String,

    /// One of: pending, processing, completed, failed
    pub status: String,

    /// Parsed text, set when processing completes
    pub content: Option<String>,

    pub chunk_count: i64,
    pub token_count: i64,

    /// Failure detail, set only when status is failed
    pub error_message: Option<String>,

    pub processed_at: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

impl KnowledgeDocument {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        knowledge_base_id: String,
        filename: String,
        file_type: String,
        file_size: i64,
        file_path: String,
        content_hash: String,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            knowledge_base_id,
            filename,
            file_type,
            file_size,
            file_path,
            content_hash,
            status: "pending".to_string(),
            content: None,
            chunk_count: 0,
            token_count: 0,
            error_message: None,
            processed_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == "pending"
    }

    pub fn is_processing(&self) -> bool {
        self.status == "processing"
    }

    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> KnowledgeDocument {
        KnowledgeDocument::new(
            "doc-1".to_string(),
            "kb-1".to_string(),
            "guide.md".to_string(),
            "md".to_string(),
            2048,
            "kb-1/doc-1".to_string(),
            "abc123".to_string(),
        )
    }

    #[test]
    fn test_document_starts_pending() {
        let doc = document();

        assert!(doc.is_pending());
        assert!(!doc.is_completed());
        assert!(doc.content.is_none());
        assert!(doc.error_message.is_none());
    }

    #[test]
    fn test_document_status_checks() {
        let mut doc = document();

        doc.status = "processing".to_string();
        assert!(doc.is_processing());

        doc.status = "completed".to_string();
        assert!(doc.is_completed());

        doc.status = "failed".to_string();
        assert!(doc.is_failed());
    }
}
