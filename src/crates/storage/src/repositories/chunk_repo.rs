//! Knowledge chunk repository for database operations

use crate::connection::DatabasePool;
use crate::models::KnowledgeChunk;

/// Repository for document chunks
pub struct ChunkRepository;

impl ChunkRepository {
    /// Insert a new chunk row
    pub async fn create(
        pool: &DatabasePool,
        chunk: KnowledgeChunk,
    ) -> Result<KnowledgeChunk, sqlx::Error> {
        sqlx::query_as::<_, KnowledgeChunk>(
            "INSERT INTO knowledge_chunks (id, document_id, knowledge_base_id, chunk_index,
                 content, start_position, end_position, token_count, vector_id,
                 embedding_cost, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(&chunk.knowledge_base_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(chunk.start_position)
        .bind(chunk.end_position)
        .bind(chunk.token_count)
        .bind(&chunk.vector_id)
        .bind(chunk.embedding_cost)
        .bind(&chunk.created_at)
        .fetch_one(pool)
        .await
    }

    /// Get a chunk by ID
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<KnowledgeChunk>, sqlx::Error> {
        sqlx::query_as::<_, KnowledgeChunk>("SELECT * FROM knowledge_chunks WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Record the backend vector id and embedding cost for a chunk
    pub async fn set_vector(
        pool: &DatabasePool,
        id: &str,
        vector_id: &str,
        embedding_cost: f64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE knowledge_chunks SET vector_id = ?, embedding_cost = ? WHERE id = ?",
        )
        .bind(vector_id)
        .bind(embedding_cost)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Chunks of a document in window order
    pub async fn list_for_document(
        pool: &DatabasePool,
        document_id: &str,
    ) -> Result<Vec<KnowledgeChunk>, sqlx::Error> {
        sqlx::query_as::<_, KnowledgeChunk>(
            "SELECT * FROM knowledge_chunks WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .fetch_all(pool)
        .await
    }

    /// Delete all chunks of a document, returning how many were removed
    pub async fn delete_for_document(
        pool: &DatabasePool,
        document_id: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM knowledge_chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Count chunks in a knowledge base
    pub async fn count_for_knowledge_base(
        pool: &DatabasePool,
        knowledge_base_id: &str,
    ) -> Result<i64, sqlx::Error> {
        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM knowledge_chunks WHERE knowledge_base_id = ?",
        )
        .bind(knowledge_base_id)
        .fetch_one(pool)
        .await?;

        Ok(result.0)
    }

    /// Accumulated embedding spend for a knowledge base
    pub async fn total_embedding_cost(
        pool: &DatabasePool,
        knowledge_base_id: &str,
    ) -> Result<f64, sqlx::Error> {
        let result: (f64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(embedding_cost), 0) FROM knowledge_chunks
             WHERE knowledge_base_id = ?",
        )
        .bind(knowledge_base_id)
        .fetch_one(pool)
        .await?;

        Ok(result.0)
    }
}
