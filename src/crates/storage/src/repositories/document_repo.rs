//! Knowledge document repository for database operations

use crate::connection::DatabasePool;
use crate::models::KnowledgeDocument;
use chrono::Utc;

/// Repository for ingested documents and their processing lifecycle
///
/// The `mark_*` transitions are conditional updates returning whether a row
/// actually moved, so concurrent processors cannot both claim a document.
pub struct DocumentRepository;

impl DocumentRepository {
    /// Insert a new document row
    pub async fn create(
        pool: &DatabasePool,
        document: KnowledgeDocument,
    ) -> Result<KnowledgeDocument, sqlx::Error> {
        sqlx::query_as::<_, KnowledgeDocument>(
            "INSERT INTO knowledge_documents (id, knowledge_base_id, filename, file_type,
                 file_size, file_path, content_hash, status, content, chunk_count,
                 token_count, error_message, processed_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&document.id)
        .bind(&document.knowledge_base_id)
        .bind(&document.filename)
        .bind(&document.file_type)
        .bind(document.file_size)
        .bind(&document.file_path)
        .bind(&document.content_hash)
        .bind(&document.status)
        .bind(&document.content)
        .bind(document.chunk_count)
        .bind(document.token_count)
        .bind(&document.error_message)
        .bind(&document.processed_at)
        .bind(&document.created_at)
        .bind(&document.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Get a document by ID
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<KnowledgeDocument>, sqlx::Error> {
        sqlx::query_as::<_, KnowledgeDocument>("SELECT * FROM knowledge_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a document by content hash inside one knowledge base
    pub async fn find_by_hash(
        pool: &DatabasePool,
        knowledge_base_id: &str,
        content_hash: &str,
    ) -> Result<Option<KnowledgeDocument>, sqlx::Error> {
        sqlx::query_as::<_, KnowledgeDocument>(
            "SELECT * FROM knowledge_documents
             WHERE knowledge_base_id = ? AND content_hash = ?",
        )
        .bind(knowledge_base_id)
        .bind(content_hash)
        .fetch_optional(pool)
        .await
    }

    /// List documents of a knowledge base, newest first
    pub async fn list_for_knowledge_base(
        pool: &DatabasePool,
        knowledge_base_id: &str,
    ) -> Result<Vec<KnowledgeDocument>, sqlx::Error> {
        sqlx::query_as::<_, KnowledgeDocument>(
            "SELECT * FROM knowledge_documents WHERE knowledge_base_id = ?
             ORDER BY created_at DESC",
        )
        .bind(knowledge_base_id)
        .fetch_all(pool)
        .await
    }

    /// Move pending or failed documents into processing.
    ///
    /// Returns false when the row was in neither state, meaning another
    /// caller got there first or the document is already done.
    pub async fn mark_processing(pool: &DatabasePool, id: &str) -> Result<bool, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE knowledge_documents SET status = 'processing', error_message = NULL,
                 updated_at = ?
             WHERE id = ? AND status IN ('pending', 'failed')",
        )
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Finish processing with the parsed content and chunk totals
    pub async fn mark_completed(
        pool: &DatabasePool,
        id: &str,
        content: &str,
        chunk_count: i64,
        token_count: i64,
    ) -> Result<bool, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE knowledge_documents SET status = 'completed', content = ?,
                 chunk_count = ?, token_count = ?, error_message = NULL,
                 processed_at = ?, updated_at = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(content)
        .bind(chunk_count)
        .bind(token_count)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a processing failure; counts stay at zero
    pub async fn mark_failed(
        pool: &DatabasePool,
        id: &str,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE knowledge_documents SET status = 'failed', error_message = ?,
                 chunk_count = 0, token_count = 0, updated_at = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(error_message)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a document; chunks cascade
    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM knowledge_documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Document counts grouped by status for one knowledge base
    pub async fn count_by_status(
        pool: &DatabasePool,
        knowledge_base_id: &str,
    ) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT status, COUNT(*) FROM knowledge_documents
             WHERE knowledge_base_id = ?
             GROUP BY status",
        )
        .bind(knowledge_base_id)
        .fetch_all(pool)
        .await
    }

    /// Document counts grouped by file type for one knowledge base
    pub async fn count_by_file_type(
        pool: &DatabasePool,
        knowledge_base_id: &str,
    ) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT file_type, COUNT(*) FROM knowledge_documents
             WHERE knowledge_base_id = ?
             GROUP BY file_type",
        )
        .bind(knowledge_base_id)
        .fetch_all(pool)
        .await
    }

    /// Total stored bytes for one knowledge base
    pub async fn total_file_size(
        pool: &DatabasePool,
        knowledge_base_id: &str,
    ) -> Result<i64, sqlx::Error> {
        let result: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(file_size), 0) FROM knowledge_documents
             WHERE knowledge_base_id = ?",
        )
        .bind(knowledge_base_id)
        .fetch_one(pool)
        .await?;

        Ok(result.0)
    }
}
