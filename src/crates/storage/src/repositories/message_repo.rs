//! Conversation message repository for database operations

use crate::connection::DatabasePool;
use crate::models::ConversationMessage;

/// Repository for conversation messages
pub struct MessageRepository;

impl MessageRepository {
    /// Insert a new message row
    pub async fn create(
        pool: &DatabasePool,
        message: ConversationMessage,
    ) -> Result<ConversationMessage, sqlx::Error> {
        sqlx::query_as::<_, ConversationMessage>(
            "INSERT INTO conversation_messages (id, conversation_id, role, content,
                 model_id, input_tokens, output_tokens, cost, latency_ms, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.role)
        .bind(&message.content)
        .bind(&message.model_id)
        .bind(message.input_tokens)
        .bind(message.output_tokens)
        .bind(message.cost)
        .bind(message.latency_ms)
        .bind(&message.created_at)
        .fetch_one(pool)
        .await
    }

    /// All messages of a conversation in chronological order
    pub async fn list_for_conversation(
        pool: &DatabasePool,
        conversation_id: &str,
    ) -> Result<Vec<ConversationMessage>, sqlx::Error> {
        sqlx::query_as::<_, ConversationMessage>(
            "SELECT * FROM conversation_messages WHERE conversation_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(conversation_id)
        .fetch_all(pool)
        .await
    }

    /// The most recent `limit` messages, returned oldest-first
    pub async fn recent_for_context(
        pool: &DatabasePool,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<ConversationMessage>, sqlx::Error> {
        let mut messages = sqlx::query_as::<_, ConversationMessage>(
            "SELECT * FROM conversation_messages WHERE conversation_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        messages.reverse();
        Ok(messages)
    }

    /// The earliest user message, used for auto-titling
    pub async fn first_user_message(
        pool: &DatabasePool,
        conversation_id: &str,
    ) -> Result<Option<ConversationMessage>, sqlx::Error> {
        sqlx::query_as::<_, ConversationMessage>(
            "SELECT * FROM conversation_messages
             WHERE conversation_id = ? AND role = 'user'
             ORDER BY created_at ASC, rowid ASC
             LIMIT 1",
        )
        .bind(conversation_id)
        .fetch_optional(pool)
        .await
    }

    /// Count messages in a conversation
    pub async fn count_for_conversation(
        pool: &DatabasePool,
        conversation_id: &str,
    ) -> Result<i64, sqlx::Error> {
        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM conversation_messages WHERE conversation_id = ?",
        )
        .bind(conversation_id)
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
            "CREATE TABLE conversation_messages (
                id TEXT PRIMARY KEY NOT NULL,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                model_id TEXT,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                cost REAL NOT NULL DEFAULT 0,
                latency_ms INTEGER,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    fn message(id: &str, role: &str, content: &str) -> ConversationMessage {
        ConversationMessage::new(
            id.to_string(),
            "conv-1".to_string(),
            role.to_string(),
            content.to_string(),
        )
    }

    #[tokio::test]
    async fn test_create_and_list_order() {
        let pool = setup_db().await;

        // Same created_at is possible inside one test; rowid breaks the tie
        MessageRepository::create(&pool, message("msg-1", "user", "first"))
            .await
            .unwrap();
        MessageRepository::create(&pool, message("msg-2", "assistant", "second"))
            .await
            .unwrap();
        MessageRepository::create(&pool, message("msg-3", "user", "third"))
            .await
            .unwrap();

        let messages = MessageRepository::list_for_conversation(&pool, "conv-1")
            .await
            .unwrap();

        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_recent_for_context_returns_tail_oldest_first() {
        let pool = setup_db().await;

        for i in 0..5 {
            MessageRepository::create(
                &pool,
                message(&format!("msg-{i}"), "user", &format!("m{i}")),
            )
            .await
            .unwrap();
        }

        let recent = MessageRepository::recent_for_context(&pool, "conv-1", 3)
            .await
            .unwrap();

        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_first_user_message_skips_system() {
        let pool = setup_db().await;

        MessageRepository::create(&pool, message("msg-1", "system", "You are helpful"))
            .await
            .unwrap();
        MessageRepository::create(&pool, message("msg-2", "user", "Plan my trip"))
            .await
            .unwrap();

        let first = MessageRepository::first_user_message(&pool, "conv-1")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.content, "Plan my trip");
    }

    #[tokio::test]
    async fn test_count_for_conversation() {
        let pool = setup_db().await;

        MessageRepository::create(&pool, message("msg-1", "user", "hello"))
            .await
            .unwrap();

        assert_eq!(
            MessageRepository::count_for_conversation(&pool, "conv-1")
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            MessageRepository::count_for_conversation(&pool, "conv-2")
                .await
                .unwrap(),
            0
        );
    }
}
