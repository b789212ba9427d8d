//! Conversation repository for database operations

use crate::connection::DatabasePool;
use crate::models::Conversation;
use chrono::Utc;

/// Repository for conversations and their cached counters
pub struct ConversationRepository;

impl ConversationRepository {
    /// Insert a new conversation row
    pub async fn create(
        pool: &DatabasePool,
        conversation: Conversation,
    ) -> Result<Conversation, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations (id, user_id, title, model_id, settings,
                 message_count, total_tokens, total_cost, last_message_at, is_archived,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&conversation.id)
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(&conversation.model_id)
        .bind(&conversation.settings)
        .bind(conversation.message_count)
        .bind(conversation.total_tokens)
        .bind(conversation.total_cost)
        .bind(&conversation.last_message_at)
        .bind(conversation.is_archived)
        .bind(&conversation.created_at)
        .bind(&conversation.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Get a conversation by ID
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Get a conversation only if the given user owns it
    pub async fn get_for_user(
        pool: &DatabasePool,
        id: &str,
        user_id: &str,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// List a user's conversations, most recently touched first
    pub async fn list_for_user(
        pool: &DatabasePool,
        user_id: &str,
        include_archived: bool,
    ) -> Result<Vec<Conversation>, sqlx::Error> {
        if include_archived {
            sqlx::query_as::<_, Conversation>(
                "SELECT * FROM conversations WHERE user_id = ?
                 ORDER BY COALESCE(last_message_at, created_at) DESC",
            )
            .bind(user_id)
            .fetch_all(pool)
            .await
        } else {
            sqlx::query_as::<_, Conversation>(
                "SELECT * FROM conversations WHERE user_id = ? AND is_archived = 0
                 ORDER BY COALESCE(last_message_at, created_at) DESC",
            )
            .bind(user_id)
            .fetch_all(pool)
            .await
        }
    }

    /// Update the title
    pub async fn update_title(
        pool: &DatabasePool,
        id: &str,
        title: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE conversations SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
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
        sqlx::query("UPDATE conversations SET settings = ?, updated_at = ? WHERE id = ?")
            .bind(settings)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Archive or unarchive a conversation
    pub async fn set_archived(
        pool: &DatabasePool,
        id: &str,
        is_archived: bool,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE conversations SET is_archived = ?, updated_at = ? WHERE id = ?")
            .bind(is_archived)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Recompute the cached counters from the message table in one statement
    pub async fn recalculate_counters(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE conversations SET
                 message_count = (SELECT COUNT(*) FROM conversation_messages
                                  WHERE conversation_id = conversations.id),
                 total_tokens = (SELECT COALESCE(SUM(input_tokens + output_tokens), 0)
                                 FROM conversation_messages
                                 WHERE conversation_id = conversations.id),
                 total_cost = (SELECT COALESCE(SUM(cost), 0) FROM conversation_messages
                               WHERE conversation_id = conversations.id),
                 last_message_at = (SELECT MAX(created_at) FROM conversation_messages
                                    WHERE conversation_id = conversations.id),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Delete a conversation; messages cascade
    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Count a user's conversations
    pub async fn count_for_user(pool: &DatabasePool, user_id: &str) -> Result<i64, sqlx::Error> {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM conversations WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        Ok(result.0)
    }
}
