//! Usage log repository for database operations

use crate::connection::DatabasePool;
use crate::models::UsageLog;

/// Repository for model-gateway usage logs
pub struct UsageLogRepository;

impl UsageLogRepository {
    /// Insert a new usage row
    pub async fn create(pool: &DatabasePool, log: UsageLog) -> Result<UsageLog, sqlx::Error> {
        sqlx::query_as::<_, UsageLog>(
            "INSERT INTO usage_logs (id, user_id, model_id, conversation_id, request_id,
                 operation, input_tokens, output_tokens, cost, response_time_ms, success,
                 error_message, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&log.id)
        .bind(&log.user_id)
        .bind(&log.model_id)
        .bind(&log.conversation_id)
        .bind(&log.request_id)
        .bind(&log.operation)
        .bind(log.input_tokens)
        .bind(log.output_tokens)
        .bind(log.cost)
        .bind(log.response_time_ms)
        .bind(log.success)
        .bind(&log.error_message)
        .bind(&log.created_at)
        .fetch_one(pool)
        .await
    }

    /// A user's most recent calls
    pub async fn list_for_user(
        pool: &DatabasePool,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<UsageLog>, sqlx::Error> {
        sqlx::query_as::<_, UsageLog>(
            "SELECT * FROM usage_logs WHERE user_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Find the row for one request id
    pub async fn find_by_request_id(
        pool: &DatabasePool,
        request_id: &str,
    ) -> Result<Option<UsageLog>, sqlx::Error> {
        sqlx::query_as::<_, UsageLog>("SELECT * FROM usage_logs WHERE request_id = ?")
            .bind(request_id)
            .fetch_optional(pool)
            .await
    }

    /// Total spend for one user across successful calls
    pub async fn total_cost_for_user(
        pool: &DatabasePool,
        user_id: &str,
    ) -> Result<f64, sqlx::Error> {
        let result: (f64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(cost), 0) FROM usage_logs WHERE user_id = ? AND success = 1",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(result.0)
    }

    /// Count a user's logged calls
    pub async fn count_for_user(pool: &DatabasePool, user_id: &str) -> Result<i64, sqlx::Error> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage_logs WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

        Ok(result.0)
    }
}
