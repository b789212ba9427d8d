//! Knowledge base repository for database operations

use crate::connection::DatabasePool;
use crate::models::KnowledgeBase;
use chrono::Utc;

/// Repository for knowledge bases and their cached counters
pub struct KnowledgeBaseRepository;

impl KnowledgeBaseRepository {
    /// Insert a new knowledge base row
    pub async fn create(
        pool: &DatabasePool,
        kb: KnowledgeBase,
    ) -> Result<KnowledgeBase, sqlx::Error> {
        sqlx::query_as::<_, KnowledgeBase>(
            "INSERT INTO knowledge_bases (id, user_id, name, description, is_public,
                 vector_backend, embedding_model, chunk_size, chunk_overlap, settings,
                 document_count, chunk_count, total_tokens, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&kb.id)
        .bind(&kb.user_id)
        .bind(&kb.name)
        .bind(&kb.description)
        .bind(kb.is_public)
        .bind(&kb.vector_backend)
        .bind(&kb.embedding_model)
        .bind(kb.chunk_size)
        .bind(kb.chunk_overlap)
        .bind(&kb.settings)
        .bind(kb.document_count)
        .bind(kb.chunk_count)
        .bind(kb.total_tokens)
        .bind(&kb.created_at)
        .bind(&kb.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Get a knowledge base by ID
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<KnowledgeBase>, sqlx::Error> {
        sqlx::query_as::<_, KnowledgeBase>("SELECT * FROM knowledge_bases WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Get a knowledge base the user may read: their own or a public one
    pub async fn get_readable(
        pool: &DatabasePool,
        id: &str,
        user_id: &str,
    ) -> Result<Option<KnowledgeBase>, sqlx::Error> {
        sqlx::query_as::<_, KnowledgeBase>(
            "SELECT * FROM knowledge_bases WHERE id = ? AND (user_id = ? OR is_public = 1)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Get a knowledge base only if the given user owns it
    pub async fn get_owned(
        pool: &DatabasePool,
        id: &str,
        user_id: &str,
    ) -> Result<Option<KnowledgeBase>, sqlx::Error> {
        sqlx::query_as::<_, KnowledgeBase>(
            "SELECT * FROM knowledge_bases WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// List a user's knowledge bases
    pub async fn list_for_user(
        pool: &DatabasePool,
        user_id: &str,
    ) -> Result<Vec<KnowledgeBase>, sqlx::Error> {
        sqlx::query_as::<_, KnowledgeBase>(
            "SELECT * FROM knowledge_bases WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Update name and description
    pub async fn update_details(
        pool: &DatabasePool,
        id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE knowledge_bases SET name = ?, description = ?, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Update the chunk geometry
    ///
    /// The caller validates `0 < overlap < size` first; the CHECK constraint
    /// is the backstop.
    pub async fn update_chunking(
        pool: &DatabasePool,
        id: &str,
        chunk_size: i64,
        chunk_overlap: i64,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE knowledge_bases SET chunk_size = ?, chunk_overlap = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(chunk_size)
        .bind(chunk_overlap)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Update the settings JSON
    pub async fn update_settings(
        pool: &DatabasePool,
        id: &str,
        settings: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE knowledge_bases SET settings = ?, updated_at = ? WHERE id = ?")
            .bind(settings)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Recompute the cached counters from documents and chunks in one statement
    pub async fn recalculate_counters(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE knowledge_bases SET
                 document_count = (SELECT COUNT(*) FROM knowledge_documents
                                   WHERE knowledge_base_id = knowledge_bases.id),
                 chunk_count = (SELECT COUNT(*) FROM knowledge_chunks
                                WHERE knowledge_base_id = knowledge_bases.id),
                 total_tokens = (SELECT COALESCE(SUM(token_count), 0) FROM knowledge_chunks
                                 WHERE knowledge_base_id = knowledge_bases.id),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Delete a knowledge base; documents and chunks cascade
    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM knowledge_bases WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Count a user's knowledge bases
    pub async fn count_for_user(pool: &DatabasePool, user_id: &str) -> Result<i64, sqlx::Error> {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM knowledge_bases WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        Ok(result.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KnowledgeChunk, KnowledgeDocument};
    use crate::repositories::{ChunkRepository, DocumentRepository};

    async fn setup_db() -> sqlx::sqlite::SqlitePool {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(
            "CREATE TABLE knowledge_bases (
                id TEXT PRIMARY KEY NOT NULL,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                is_public INTEGER NOT NULL DEFAULT 0,
                vector_backend TEXT NOT NULL DEFAULT 'memory',
                embedding_model TEXT NOT NULL DEFAULT 'text-embedding-ada-002',
                chunk_size INTEGER NOT NULL DEFAULT 1000,
                chunk_overlap INTEGER NOT NULL DEFAULT 200,
                settings TEXT NOT NULL DEFAULT '{}',
                document_count INTEGER NOT NULL DEFAULT 0,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            "CREATE TABLE knowledge_documents (
                id TEXT PRIMARY KEY NOT NULL,
                knowledge_base_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                file_path TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                content TEXT,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                token_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                processed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            "CREATE TABLE knowledge_chunks (
                id TEXT PRIMARY KEY NOT NULL,
                document_id TEXT NOT NULL,
                knowledge_base_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                start_position INTEGER NOT NULL,
                end_position INTEGER NOT NULL,
                token_count INTEGER NOT NULL DEFAULT 0,
                vector_id TEXT,
                embedding_cost REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    fn kb(id: &str, user_id: &str) -> KnowledgeBase {
        KnowledgeBase::new(id.to_string(), user_id.to_string(), "Docs".to_string())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let pool = setup_db().await;

        KnowledgeBaseRepository::create(&pool, kb("kb-1", "user-1"))
            .await
            .unwrap();

        let fetched = KnowledgeBaseRepository::get_by_id(&pool, "kb-1")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(fetched.name, "Docs");
        assert_eq!(fetched.vector_backend, "memory");
    }

    #[tokio::test]
    async fn test_readable_covers_public_rows() {
        let pool = setup_db().await;

        KnowledgeBaseRepository::create(&pool, kb("kb-1", "user-1").public())
            .await
            .unwrap();
        KnowledgeBaseRepository::create(&pool, kb("kb-2", "user-1"))
            .await
            .unwrap();

        // Public row readable by anyone, private row only by its owner
        assert!(KnowledgeBaseRepository::get_readable(&pool, "kb-1", "user-2")
            .await
            .unwrap()
            .is_some());
        assert!(KnowledgeBaseRepository::get_readable(&pool, "kb-2", "user-2")
            .await
            .unwrap()
            .is_none());

        // Writes stay owner-only
        assert!(KnowledgeBaseRepository::get_owned(&pool, "kb-1", "user-2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_chunking() {
        let pool = setup_db().await;

        KnowledgeBaseRepository::create(&pool, kb("kb-1", "user-1"))
            .await
            .unwrap();
        KnowledgeBaseRepository::update_chunking(&pool, "kb-1", 500, 50)
            .await
            .unwrap();

        let fetched = KnowledgeBaseRepository::get_by_id(&pool, "kb-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.chunk_size, 500);
        assert_eq!(fetched.chunk_overlap, 50);
    }

    #[tokio::test]
    async fn test_recalculate_counters() {
        let pool = setup_db().await;

        KnowledgeBaseRepository::create(&pool, kb("kb-1", "user-1"))
            .await
            .unwrap();

        DocumentRepository::create(
            &pool,
            KnowledgeDocument::new(
                "doc-1".to_string(),
                "kb-1".to_string(),
                "guide.md".to_string(),
                "md".to_string(),
                100,
                "kb-1/doc-1".to_string(),
                "hash-1".to_string(),
            ),
        )
        .await
        .unwrap();

        for i in 0..2 {
            ChunkRepository::create(
                &pool,
                KnowledgeChunk::new(
                    format!("chunk-{i}"),
                    "doc-1".to_string(),
                    "kb-1".to_string(),
                    i,
                    "text".to_string(),
                    0,
                    4,
                    25,
                ),
            )
            .await
            .unwrap();
        }

        KnowledgeBaseRepository::recalculate_counters(&pool, "kb-1")
            .await
            .unwrap();

        let fetched = KnowledgeBaseRepository::get_by_id(&pool, "kb-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.document_count, 1);
        assert_eq!(fetched.chunk_count, 2);
        assert_eq!(fetched.total_tokens, 50);
    }
}
