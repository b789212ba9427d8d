//! Memory repository for database operations

use crate::connection::DatabasePool;
use crate::models::Memory;
use sqlx::FromRow;

/// Per-type aggregate row for memory statistics
#[derive(Debug, Clone, FromRow)]
pub struct MemoryTypeStats {
    pub memory_type: String,
    pub count: i64,
    pub avg_importance: f64,
}

/// Repository for typed user memories
///
/// Expiry is evaluated against the caller-supplied `now` string so reads never
/// return stale rows even before a cleanup pass has run.
pub struct MemoryRepository;

impl MemoryRepository {
    /// Insert or overwrite the memory at (user_id, memory_type, key, context).
    ///
    /// Overwrites reset access_count to 1; created_at keeps its original value.
    pub async fn upsert(pool: &DatabasePool, memory: Memory) -> Result<Memory, sqlx::Error> {
        sqlx::query_as::<_, Memory>(
            "INSERT INTO memories (id, user_id, memory_type, key, value, context, metadata,
                 importance_score, access_count, last_accessed_at, expires_at,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id, memory_type, key, context) DO UPDATE SET
                 value = excluded.value,
                 metadata = excluded.metadata,
                 importance_score = excluded.importance_score,
                 access_count = 1,
                 last_accessed_at = excluded.last_accessed_at,
                 expires_at = excluded.expires_at,
                 updated_at = excluded.updated_at
             RETURNING *",
        )
        .bind(&memory.id)
        .bind(&memory.user_id)
        .bind(&memory.memory_type)
        .bind(&memory.key)
        .bind(&memory.value)
        .bind(&memory.context)
        .bind(&memory.metadata)
        .bind(memory.importance_score)
        .bind(memory.access_count)
        .bind(&memory.last_accessed_at)
        .bind(&memory.expires_at)
        .bind(&memory.created_at)
        .bind(&memory.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Exact lookup, skipping expired rows
    pub async fn find(
        pool: &DatabasePool,
        user_id: &str,
        memory_type: &str,
        key: &str,
        context: &str,
        now: &str,
    ) -> Result<Option<Memory>, sqlx::Error> {
        sqlx::query_as::<_, Memory>(
            "SELECT * FROM memories
             WHERE user_id = ? AND memory_type = ? AND key = ? AND context = ?
               AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(user_id)
        .bind(memory_type)
        .bind(key)
        .bind(context)
        .bind(now)
        .fetch_optional(pool)
        .await
    }

    /// Bump access_count and last_accessed_at after a successful read
    pub async fn touch_access(pool: &DatabasePool, id: &str, now: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?
             WHERE id = ?",
        )
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Non-expired memories of one type, most important first
    pub async fn list_by_type(
        pool: &DatabasePool,
        user_id: &str,
        memory_type: &str,
        now: &str,
        limit: i64,
    ) -> Result<Vec<Memory>, sqlx::Error> {
        sqlx::query_as::<_, Memory>(
            "SELECT * FROM memories
             WHERE user_id = ? AND memory_type = ?
               AND (expires_at IS NULL OR expires_at > ?)
             ORDER BY importance_score DESC, last_accessed_at DESC
             LIMIT ?",
        )
        .bind(user_id)
        .bind(memory_type)
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Non-expired memories scoped to a context, most important first
    pub async fn list_for_context(
        pool: &DatabasePool,
        user_id: &str,
        context: &str,
        now: &str,
        limit: i64,
    ) -> Result<Vec<Memory>, sqlx::Error> {
        sqlx::query_as::<_, Memory>(
            "SELECT * FROM memories
             WHERE user_id = ? AND context = ?
               AND (expires_at IS NULL OR expires_at > ?)
             ORDER BY importance_score DESC, last_accessed_at DESC
             LIMIT ?",
        )
        .bind(user_id)
        .bind(context)
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Non-expired memories at or above an importance threshold
    pub async fn list_important(
        pool: &DatabasePool,
        user_id: &str,
        threshold: i64,
        now: &str,
    ) -> Result<Vec<Memory>, sqlx::Error> {
        sqlx::query_as::<_, Memory>(
            "SELECT * FROM memories
             WHERE user_id = ? AND importance_score >= ?
               AND (expires_at IS NULL OR expires_at > ?)
             ORDER BY importance_score DESC, last_accessed_at DESC",
        )
        .bind(user_id)
        .bind(threshold)
        .bind(now)
        .fetch_all(pool)
        .await
    }

    /// Short-term rows eligible for consolidation
    pub async fn consolidation_candidates(
        pool: &DatabasePool,
        user_id: &str,
        min_importance: i64,
        min_access_count: i64,
        now: &str,
    ) -> Result<Vec<Memory>, sqlx::Error> {
        sqlx::query_as::<_, Memory>(
            "SELECT * FROM memories
             WHERE user_id = ? AND memory_type = 'short_term'
               AND importance_score >= ? AND access_count >= ?
               AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(user_id)
        .bind(min_importance)
        .bind(min_access_count)
        .bind(now)
        .fetch_all(pool)
        .await
    }

    /// Count a user's rows already past their expiry
    pub async fn count_expired(
        pool: &DatabasePool,
        user_id: &str,
        now: &str,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM memories
             WHERE user_id = ? AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Delete rows past their expiry, returning the count
    pub async fn delete_expired(pool: &DatabasePool, now: &str) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM memories WHERE expires_at IS NOT NULL AND expires_at <= ?")
                .bind(now)
                .execute(pool)
                .await?;

        Ok(result.rows_affected())
    }

    /// Keep a user's top `keep` memories by importance, delete the rest
    pub async fn delete_excess_by_importance(
        pool: &DatabasePool,
        user_id: &str,
        keep: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM memories
             WHERE user_id = ? AND id NOT IN (
                 SELECT id FROM memories WHERE user_id = ?
                 ORDER BY importance_score DESC, last_accessed_at DESC
                 LIMIT ?
             )",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(keep)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete one memory
    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM memories WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Per-type counts and average importance for one user
    pub async fn stats_by_type(
        pool: &DatabasePool,
        user_id: &str,
    ) -> Result<Vec<MemoryTypeStats>, sqlx::Error> {
        sqlx::query_as::<_, MemoryTypeStats>(
            "SELECT memory_type, COUNT(*) AS count,
                    AVG(CAST(importance_score AS REAL)) AS avg_importance
             FROM memories
             WHERE user_id = ?
             GROUP BY memory_type
             ORDER BY memory_type",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}
