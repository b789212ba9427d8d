//! AI model repository for database operations

use crate::connection::DatabasePool;
use crate::models::AiModel;
use chrono::Utc;

/// Repository for the model catalog
pub struct AiModelRepository;

impl AiModelRepository {
    /// Insert a new model row
    pub async fn create(pool: &DatabasePool, model: AiModel) -> Result<AiModel, sqlx::Error> {
        sqlx::query_as::<_, AiModel>(
            "INSERT INTO ai_models (id, provider, model_id, display_name, description,
                 max_tokens, supports_streaming, supports_functions, supports_vision,
                 input_cost_per_1k, output_cost_per_1k, rate_limit_per_minute,
                 is_active, is_default, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&model.id)
        .bind(&model.provider)
        .bind(&model.model_id)
        .bind(&model.display_name)
        .bind(&model.description)
        .bind(model.max_tokens)
        .bind(model.supports_streaming)
        .bind(model.supports_functions)
        .bind(model.supports_vision)
        .bind(model.input_cost_per_1k)
        .bind(model.output_cost_per_1k)
        .bind(model.rate_limit_per_minute)
        .bind(model.is_active)
        .bind(model.is_default)
        .bind(&model.created_at)
        .bind(&model.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Get a model by ID
    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<AiModel>, sqlx::Error> {
        sqlx::query_as::<_, AiModel>("SELECT * FROM ai_models WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find an active model by its provider-scoped name, e.g. "gpt-3.5-turbo"
    pub async fn find_active_by_model_id(
        pool: &DatabasePool,
        model_id: &str,
    ) -> Result<Option<AiModel>, sqlx::Error> {
        sqlx::query_as::<_, AiModel>(
            "SELECT * FROM ai_models WHERE model_id = ? AND is_active = 1",
        )
        .bind(model_id)
        .fetch_optional(pool)
        .await
    }

    /// Get the system default model, if one is marked
    pub async fn get_default(pool: &DatabasePool) -> Result<Option<AiModel>, sqlx::Error> {
        sqlx::query_as::<_, AiModel>(
            "SELECT * FROM ai_models WHERE is_default = 1 AND is_active = 1 LIMIT 1",
        )
        .fetch_optional(pool)
        .await
    }

    /// List all models
    pub async fn list(pool: &DatabasePool) -> Result<Vec<AiModel>, sqlx::Error> {
        sqlx::query_as::<_, AiModel>("SELECT * FROM ai_models ORDER BY provider, model_id")
            .fetch_all(pool)
            .await
    }

    /// List active models
    pub async fn list_active(pool: &DatabasePool) -> Result<Vec<AiModel>, sqlx::Error> {
        sqlx::query_as::<_, AiModel>(
            "SELECT * FROM ai_models WHERE is_active = 1 ORDER BY provider, model_id",
        )
        .fetch_all(pool)
        .await
    }

    /// Activate or deactivate a model
    pub async fn set_active(
        pool: &DatabasePool,
        id: &str,
        is_active: bool,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE ai_models SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Mark one model as the system default, clearing any previous default
    pub async fn set_default(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        // Single statement keeps the "at most one default" invariant atomic
        sqlx::query("UPDATE ai_models SET is_default = (id = ?), updated_at = ?")
            .bind(id)
            .bind(&now)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Delete a model
    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM ai_models WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Count total models
    pub async fn count(pool: &DatabasePool) -> Result<i64, sqlx::Error> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ai_models")
            .fetch_one(pool)
            .await?;

        Ok(result.0)
    }
}
