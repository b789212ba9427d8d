//! Workflow execution log repository for database operations

use crate::connection::DatabasePool;
use crate::models::WorkflowExecutionLog;
use chrono::Utc;

/// Repository for per-node execution logs
pub struct ExecutionLogRepository;

impl ExecutionLogRepository {
    /// Insert a log row; the model decides whether it starts running or skipped
    pub async fn create(
        pool: &DatabasePool,
        log: WorkflowExecutionLog,
    ) -> Result<WorkflowExecutionLog, sqlx::Error> {
        sqlx::query_as::<_, WorkflowExecutionLog>(
            "INSERT INTO workflow_execution_logs (id, execution_id, node_id, node_type,
                 status, input_data, output_data, error_message, cost, duration_ms,
                 started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&log.id)
        .bind(&log.execution_id)
        .bind(&log.node_id)
        .bind(&log.node_type)
        .bind(&log.status)
        .bind(&log.input_data)
        .bind(&log.output_data)
        .bind(&log.error_message)
        .bind(log.cost)
        .bind(log.duration_ms)
        .bind(&log.started_at)
        .bind(&log.completed_at)
        .fetch_one(pool)
        .await
    }

    /// Finish a running attempt with its output snapshot
    pub async fn mark_completed(
        pool: &DatabasePool,
        id: &str,
        output_data: &str,
        cost: f64,
        duration_ms: i64,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE workflow_execution_logs SET status = 'completed', output_data = ?,
                 cost = ?, duration_ms = ?, completed_at = ?
             WHERE id = ?",
        )
        .bind(output_data)
        .bind(cost)
        .bind(duration_ms)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Finish a running attempt with its error
    pub async fn mark_failed(
        pool: &DatabasePool,
        id: &str,
        error_message: &str,
        duration_ms: i64,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE workflow_execution_logs SET status = 'failed', error_message = ?,
                 duration_ms = ?, completed_at = ?
             WHERE id = ?",
        )
        .bind(error_message)
        .bind(duration_ms)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// All log rows of an execution in write order
    pub async fn list_for_execution(
        pool: &DatabasePool,
        execution_id: &str,
    ) -> Result<Vec<WorkflowExecutionLog>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowExecutionLog>(
            "SELECT * FROM workflow_execution_logs WHERE execution_id = ?
             ORDER BY started_at ASC, rowid ASC",
        )
        .bind(execution_id)
        .fetch_all(pool)
        .await
    }

    /// Attempts for one node inside an execution, oldest first
    pub async fn list_for_node(
        pool: &DatabasePool,
        execution_id: &str,
        node_id: &str,
    ) -> Result<Vec<WorkflowExecutionLog>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowExecutionLog>(
            "SELECT * FROM workflow_execution_logs WHERE execution_id = ? AND node_id = ?
             ORDER BY started_at ASC, rowid ASC",
        )
        .bind(execution_id)
        .bind(node_id)
        .fetch_all(pool)
        .await
    }

    /// Log counts grouped by status for one execution
    pub async fn count_by_status(
        pool: &DatabasePool,
        execution_id: &str,
    ) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT status, COUNT(*) FROM workflow_execution_logs
             WHERE execution_id = ?
             GROUP BY status",
        )
        .bind(execution_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> sqlx::sqlite::SqlitePool {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(
            "CREATE TABLE workflow_execution_logs (
                id TEXT PRIMARY KEY NOT NULL,
                execution_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                node_type TEXT NOT NULL,
                status TEXT NOT NULL,
                input_data TEXT,
                output_data TEXT,
                error_message TEXT,
                cost REAL NOT NULL DEFAULT 0,
                duration_ms INTEGER,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                CHECK (status IN ('running', 'completed', 'failed', 'skipped'))
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    fn log(id: &str, node_id: &str) -> WorkflowExecutionLog {
        WorkflowExecutionLog::new(
            id.to_string(),
            "exec-1".to_string(),
            node_id.to_string(),
            "ai_call".to_string(),
        )
    }

    #[tokio::test]
    async fn test_attempt_completes_with_snapshot() {
        let pool = setup_db().await;

        ExecutionLogRepository::create(
            &pool,
            log("log-1", "node-a").with_input(r#"{"prompt": "hi"}"#),
        )
        .await
        .unwrap();

        ExecutionLogRepository::mark_completed(&pool, "log-1", r#"{"response": "ok"}"#, 0.002, 340)
            .await
            .unwrap();

        let logs = ExecutionLogRepository::list_for_execution(&pool, "exec-1")
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].is_completed());
        assert_eq!(logs[0].output_data, Some(r#"{"response": "ok"}"#.to_string()));
        assert_eq!(logs[0].duration_ms, Some(340));
    }

    #[tokio::test]
    async fn test_retry_attempts_keep_separate_rows() {
        let pool = setup_db().await;

        ExecutionLogRepository::create(&pool, log("log-1", "node-a"))
            .await
            .unwrap();
        ExecutionLogRepository::mark_failed(&pool, "log-1", "timeout", 500)
            .await
            .unwrap();

        ExecutionLogRepository::create(&pool, log("log-2", "node-a"))
            .await
            .unwrap();
        ExecutionLogRepository::mark_completed(&pool, "log-2", "{}", 0.0, 120)
            .await
            .unwrap();

        let attempts = ExecutionLogRepository::list_for_node(&pool, "exec-1", "node-a")
            .await
            .unwrap();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[0].is_failed());
        assert!(attempts[1].is_completed());
    }

    #[tokio::test]
    async fn test_skipped_rows_and_status_counts() {
        let pool = setup_db().await;

        ExecutionLogRepository::create(&pool, log("log-1", "node-a"))
            .await
            .unwrap();
        ExecutionLogRepository::mark_failed(&pool, "log-1", "boom", 10)
            .await
            .unwrap();
        ExecutionLogRepository::create(
            &pool,
            WorkflowExecutionLog::skipped(
                "log-2".to_string(),
                "exec-1".to_string(),
                "node-b".to_string(),
                "condition".to_string(),
            ),
        )
        .await
        .unwrap();

        let counts = ExecutionLogRepository::count_by_status(&pool, "exec-1")
            .await
            .unwrap();
        assert!(counts.contains(&("failed".to_string(), 1)));
        assert!(counts.contains(&("skipped".to_string(), 1)));
    }
}
