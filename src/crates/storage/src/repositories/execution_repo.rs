//! Workflow execution repository for database operations

use crate::connection::DatabasePool;
use crate::models::WorkflowExecution;
use chrono::Utc;

/// Repository for workflow executions
///
/// Status moves only through the `try_*` conditional updates; each returns
/// whether the row transitioned so callers can detect a lost race instead of
/// silently double-finishing a run.
pub struct ExecutionRepository;

impl ExecutionRepository {
    /// Insert a new execution row in `pending`
    pub async fn create(
        pool: &DatabasePool,
        execution: WorkflowExecution,
    ) -> Result<WorkflowExecution, sqlx::Error> {
        sqlx::query_as::<_, WorkflowExecution>(
            "INSERT INTO workflow_executions (id, workflow_id, user_id, status, input_data,
                 variables, output_data, error_message, total_nodes, completed_nodes,
                 failed_nodes, total_cost, started_at, completed_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&execution.id)
        .bind(&execution.workflow_id)
        .bind(&execution.user_id)
        .bind(&execution.status)
        .bind(&execution.input_data)
        .bind(&execution.variables)
        .bind(&execution.output_data)
        .bind(&execution.error_message)
        .bind(execution.total_nodes)
        .bind(execution.completed_nodes)
        .bind(execution.failed_nodes)
        .bind(execution.total_cost)
        .bind(&execution.started_at)
        .bind(&execution.completed_at)
        .bind(&execution.created_at)
        .bind(&execution.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Get an execution by ID
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<WorkflowExecution>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowExecution>("SELECT * FROM workflow_executions WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Get an execution only if the given user owns it
    pub async fn get_for_user(
        pool: &DatabasePool,
        id: &str,
        user_id: &str,
    ) -> Result<Option<WorkflowExecution>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowExecution>(
            "SELECT * FROM workflow_executions WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Just the status column, for cancellation polling between nodes
    pub async fn get_status(pool: &DatabasePool, id: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM workflow_executions WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await?;

        Ok(row.map(|r| r.0))
    }

    /// Recent executions of a workflow, newest first
    pub async fn list_for_workflow(
        pool: &DatabasePool,
        workflow_id: &str,
        limit: i64,
    ) -> Result<Vec<WorkflowExecution>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowExecution>(
            "SELECT * FROM workflow_executions WHERE workflow_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// pending -> running, stamping started_at
    pub async fn try_start(pool: &DatabasePool, id: &str) -> Result<bool, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE workflow_executions SET status = 'running', started_at = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// running -> completed with the collected node outputs
    pub async fn try_complete(
        pool: &DatabasePool,
        id: &str,
        output_data: &str,
    ) -> Result<bool, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE workflow_executions SET status = 'completed', output_data = ?,
                 completed_at = ?, updated_at = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(output_data)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// running -> failed with the terminal error
    pub async fn try_fail(
        pool: &DatabasePool,
        id: &str,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE workflow_executions SET status = 'failed', error_message = ?,
                 completed_at = ?, updated_at = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(error_message)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// pending or running -> cancelled
    pub async fn try_cancel(pool: &DatabasePool, id: &str) -> Result<bool, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE workflow_executions SET status = 'cancelled', completed_at = ?, updated_at = ?
             WHERE id = ? AND status IN ('pending', 'running')",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record how many nodes the run will visit
    pub async fn set_total_nodes(
        pool: &DatabasePool,
        id: &str,
        total_nodes: i64,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE workflow_executions SET total_nodes = ?, updated_at = ? WHERE id = ?")
            .bind(total_nodes)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Atomic node-success counter bump
    pub async fn increment_completed(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE workflow_executions SET completed_nodes = completed_nodes + 1, updated_at = ?
             WHERE id = ?",
        )
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Atomic node-failure counter bump
    pub async fn increment_failed(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE workflow_executions SET failed_nodes = failed_nodes + 1, updated_at = ?
             WHERE id = ?",
        )
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Atomic cost accumulation
    pub async fn add_cost(pool: &DatabasePool, id: &str, delta: f64) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE workflow_executions SET total_cost = total_cost + ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(delta)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Count executions of a workflow
    pub async fn count_for_workflow(
        pool: &DatabasePool,
        workflow_id: &str,
    ) -> Result<i64, sqlx::Error> {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM workflow_executions WHERE workflow_id = ?")
                .bind(workflow_id)
                .fetch_one(pool)
                .await?;

        Ok(result.0)
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
            "CREATE TABLE workflow_executions (
                id TEXT PRIMARY KEY NOT NULL,
                workflow_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                input_data TEXT NOT NULL DEFAULT '{}',
                variables TEXT NOT NULL DEFAULT '{}',
                output_data TEXT,
                error_message TEXT,
                total_nodes INTEGER NOT NULL DEFAULT 0,
                completed_nodes INTEGER NOT NULL DEFAULT 0,
                failed_nodes INTEGER NOT NULL DEFAULT 0,
                total_cost REAL NOT NULL DEFAULT 0,
                started_at TEXT,
                completed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK (status IN ('pending', 'running', 'completed', 'failed', 'cancelled'))
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    fn execution(id: &str) -> WorkflowExecution {
        WorkflowExecution::new(id.to_string(), "workflow-1".to_string(), "user-1".to_string())
    }

    #[tokio::test]
    async fn test_lifecycle_happy_path() {
        let pool = setup_db().await;

        ExecutionRepository::create(&pool, execution("exec-1")).await.unwrap();

        assert!(ExecutionRepository::try_start(&pool, "exec-1").await.unwrap());
        assert!(
            ExecutionRepository::try_complete(&pool, "exec-1", r#"{"node-a": {}}"#)
                .await
                .unwrap()
        );

        let exec = ExecutionRepository::get_by_id(&pool, "exec-1")
            .await
            .unwrap()
            .unwrap();
        assert!(exec.is_completed());
        assert!(exec.started_at.is_some());
        assert!(exec.completed_at.is_some());
        assert_eq!(exec.output_data, Some(r#"{"node-a": {}}"#.to_string()));
    }

    #[tokio::test]
    async fn test_guarded_transitions_reject_wrong_state() {
        let pool = setup_db().await;

        ExecutionRepository::create(&pool, execution("exec-1")).await.unwrap();

        // Cannot complete or fail a pending run
        assert!(!ExecutionRepository::try_complete(&pool, "exec-1", "{}")
            .await
            .unwrap());
        assert!(!ExecutionRepository::try_fail(&pool, "exec-1", "boom")
            .await
            .unwrap());

        assert!(ExecutionRepository::try_start(&pool, "exec-1").await.unwrap());
        // Double start loses the race
        assert!(!ExecutionRepository::try_start(&pool, "exec-1").await.unwrap());

        assert!(ExecutionRepository::try_fail(&pool, "exec-1", "boom")
            .await
            .unwrap());
        // Terminal rows stay terminal
        assert!(!ExecutionRepository::try_cancel(&pool, "exec-1").await.unwrap());

        let exec = ExecutionRepository::get_by_id(&pool, "exec-1")
            .await
            .unwrap()
            .unwrap();
        assert!(exec.is_failed());
        assert_eq!(exec.error_message, Some("boom".to_string()));
    }

    #[tokio::test]
    async fn test_cancel_from_pending_and_running() {
        let pool = setup_db().await;

        ExecutionRepository::create(&pool, execution("exec-1")).await.unwrap();
        assert!(ExecutionRepository::try_cancel(&pool, "exec-1").await.unwrap());

        ExecutionRepository::create(&pool, execution("exec-2")).await.unwrap();
        ExecutionRepository::try_start(&pool, "exec-2").await.unwrap();
        assert!(ExecutionRepository::try_cancel(&pool, "exec-2").await.unwrap());

        assert_eq!(
            ExecutionRepository::get_status(&pool, "exec-2")
                .await
                .unwrap()
                .unwrap(),
            "cancelled"
        );
    }

    #[tokio::test]
    async fn test_counters_and_cost_accumulate() {
        let pool = setup_db().await;

        ExecutionRepository::create(&pool, execution("exec-1")).await.unwrap();
        ExecutionRepository::set_total_nodes(&pool, "exec-1", 3)
            .await
            .unwrap();

        ExecutionRepository::increment_completed(&pool, "exec-1")
            .await
            .unwrap();
        ExecutionRepository::increment_completed(&pool, "exec-1")
            .await
            .unwrap();
        ExecutionRepository::increment_failed(&pool, "exec-1")
            .await
            .unwrap();
        ExecutionRepository::add_cost(&pool, "exec-1", 0.001).await.unwrap();
        ExecutionRepository::add_cost(&pool, "exec-1", 0.0005).await.unwrap();

        let exec = ExecutionRepository::get_by_id(&pool, "exec-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exec.total_nodes, 3);
        assert_eq!(exec.completed_nodes, 2);
        assert_eq!(exec.failed_nodes, 1);
        assert!((exec.total_cost - 0.0015).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_list_for_workflow_limits() {
        let pool = setup_db().await;

        for i in 0..5 {
            ExecutionRepository::create(&pool, execution(&format!("exec-{i}")))
                .await
                .unwrap();
        }

        let recent = ExecutionRepository::list_for_workflow(&pool, "workflow-1", 3)
            .await
            .unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(
            ExecutionRepository::count_for_workflow(&pool, "workflow-1")
                .await
                .unwrap(),
            5
        );
    }
}
