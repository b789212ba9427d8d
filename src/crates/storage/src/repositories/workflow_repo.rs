//! Workflow repository for database operations

use crate::connection::DatabasePool;
use crate::models::Workflow;
use chrono::Utc;

/// Repository for workflow definitions
pub struct WorkflowRepository;

impl WorkflowRepository {
    /// Insert a new workflow row
    pub async fn create(pool: &DatabasePool, workflow: Workflow) -> Result<Workflow, sqlx::Error> {
        sqlx::query_as::<_, Workflow>(
            "INSERT INTO workflows (id, user_id, name, description, definition, status,
                 variables, settings, is_public, execution_count, last_executed_at,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&workflow.id)
        .bind(&workflow.user_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(&workflow.definition)
        .bind(&workflow.status)
        .bind(&workflow.variables)
        .bind(&workflow.settings)
        .bind(workflow.is_public)
        .bind(workflow.execution_count)
        .bind(&workflow.last_executed_at)
        .bind(&workflow.created_at)
        .bind(&workflow.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Get a workflow by ID
    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<Workflow>, sqlx::Error> {
        sqlx::query_as::<_, Workflow>("SELECT * FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Get a workflow the user may read: their own or a public one
    pub async fn get_readable(
        pool: &DatabasePool,
        id: &str,
        user_id: &str,
    ) -> Result<Option<Workflow>, sqlx::Error> {
        sqlx::query_as::<_, Workflow>(
            "SELECT * FROM workflows WHERE id = ? AND (user_id = ? OR is_public = 1)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Get a workflow only if the given user owns it
    pub async fn get_owned(
        pool: &DatabasePool,
        id: &str,
        user_id: &str,
    ) -> Result<Option<Workflow>, sqlx::Error> {
        sqlx::query_as::<_, Workflow>("SELECT * FROM workflows WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's workflows
    pub async fn list_for_user(
        pool: &DatabasePool,
        user_id: &str,
    ) -> Result<Vec<Workflow>, sqlx::Error> {
        sqlx::query_as::<_, Workflow>(
            "SELECT * FROM workflows WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// List a user's workflows in one status
    pub async fn list_by_status(
        pool: &DatabasePool,
        user_id: &str,
        status: &str,
    ) -> Result<Vec<Workflow>, sqlx::Error> {
        sqlx::query_as::<_, Workflow>(
            "SELECT * FROM workflows WHERE user_id = ? AND status = ?
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(status)
        .fetch_all(pool)
        .await
    }

    /// Update workflow status
    pub async fn update_status(
        pool: &DatabasePool,
        id: &str,
        status: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE workflows SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Update workflow definition
    pub async fn update_definition(
        pool: &DatabasePool,
        id: &str,
        definition: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE workflows SET definition = ?, updated_at = ? WHERE id = ?")
            .bind(definition)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Update the default variable bindings
    pub async fn update_variables(
        pool: &DatabasePool,
        id: &str,
        variables: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE workflows SET variables = ?, updated_at = ? WHERE id = ?")
            .bind(variables)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Update the execution settings JSON
    pub async fn update_settings(
        pool: &DatabasePool,
        id: &str,
        settings: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE workflows SET settings = ?, updated_at = ? WHERE id = ?")
            .bind(settings)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Bump execution_count and last_executed_at when a run starts
    pub async fn record_execution(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE workflows SET execution_count = execution_count + 1,
                 last_executed_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Delete a workflow; executions and logs cascade
    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Count a user's workflows
    pub async fn count_for_user(pool: &DatabasePool, user_id: &str) -> Result<i64, sqlx::Error> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workflows WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

        Ok(result.0)
    }
}
