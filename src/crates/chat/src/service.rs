//! Conversation orchestration over the gateway, the message store, and memory.
//!
//! [`ConversationService`] owns one chat turn end to end: persist the user
//! message, assemble the model context (system prompt, recalled memories,
//! recent history), call the gateway, persist the assistant reply, refresh
//! the conversation's cached counters, and write the exchange back into
//! memory. The streaming variant defers the persistence tail until the
//! returned stream finishes.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use llm::{CallOptions, ModelGateway};
use memory::{MemoryService, MemoryType, RetrievedMemory, StoreOptions};
use platform::llm::{ChatMessage, ChatStream, MessageRole, TokenUsage};
use platform::{PlatformError, Result};
use storage::models::{Conversation, ConversationMessage};
use storage::repositories::{ConversationRepository, MessageRepository};
use storage::DatabasePool;

use crate::extract;

/// History window sent to the model when nothing overrides it
const DEFAULT_CONTEXT_MESSAGES: i64 = 20;

/// Memory hits folded into the context per turn
const MEMORY_RECALL_LIMIT: usize = 10;

/// Character cap for auto-generated titles
const TITLE_MAX_CHARS: usize = 50;

/// Importance of the per-exchange short-term memory
const EXCHANGE_IMPORTANCE: i64 = 3;

/// Optional fields for [`ConversationService::create_conversation`]
#[derive(Debug, Clone, Default)]
pub struct CreateConversation {
    pub title: Option<String>,
    /// Preferred provider model identifier (e.g. "gpt-4")
    pub model_id: Option<String>,
    /// Settings JSON stored on the row
    pub settings: Option<Value>,
}

/// Per-turn overrides; anything unset falls back to the conversation's
/// stored settings, then the platform defaults
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Provider model identifier override (e.g. "gpt-4")
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub max_context_messages: Option<i64>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
}

impl SendOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_context_messages(mut self, count: i64) -> Self {
        self.max_context_messages = Some(count);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// One turn's settings after folding per-call overrides over the
/// conversation's stored settings JSON. Malformed stored settings are
/// ignored rather than failing the turn.
#[derive(Debug, Clone)]
struct TurnSettings {
    /// Model preference carried by the conversation itself: the settings
    /// JSON `model` key, else the row's `model_id` column
    conversation_model: Option<String>,
    system_prompt: Option<String>,
    max_context_messages: i64,
    temperature: Option<f64>,
    max_tokens: Option<i64>,
}

impl TurnSettings {
    fn merge(conversation: &Conversation, options: &SendOptions) -> Self {
        let stored: Value = serde_json::from_str(&conversation.settings).unwrap_or(Value::Null);
        let stored_str =
            |key: &str| stored.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            conversation_model: stored_str("model").or_else(|| conversation.model_id.clone()),
            system_prompt: options
                .system_prompt
                .clone()
                .or_else(|| stored_str("system_prompt")),
            max_context_messages: options
                .max_context_messages
                .or_else(|| stored.get("max_context_messages").and_then(Value::as_i64))
                .unwrap_or(DEFAULT_CONTEXT_MESSAGES),
            temperature: options
                .temperature
                .or_else(|| stored.get("temperature").and_then(Value::as_f64)),
            max_tokens: options
                .max_tokens
                .or_else(|| stored.get("max_tokens").and_then(Value::as_i64)),
        }
    }
}

/// Chat orchestrator over the shared pool, the model gateway, and memory
#[derive(Clone)]
pub struct ConversationService {
    pool: DatabasePool,
    gateway: Arc<ModelGateway>,
    memory: MemoryService,
}

impl ConversationService {
    pub fn new(pool: DatabasePool, gateway: Arc<ModelGateway>, memory: MemoryService) -> Self {
        Self {
            pool,
            gateway,
            memory,
        }
    }

    pub async fn create_conversation(
        &self,
        user_id: &str,
        options: CreateConversation,
    ) -> Result<Conversation> {
        let mut conversation = Conversation::new(Uuid::new_v4().to_string(), user_id.to_string());
        if let Some(title) = options.title {
            conversation = conversation.with_title(title);
        }
        if let Some(model_id) = options.model_id {
            conversation = conversation.with_model(model_id);
        }
        if let Some(settings) = options.settings {
            conversation = conversation.with_settings(settings.to_string());
        }

        let created = ConversationRepository::create(&self.pool, conversation).await?;
        info!(conversation_id = %created.id, user_id, "conversation created");
        Ok(created)
    }

    /// A user's conversations, most recently touched first
    pub async fn list_conversations(
        &self,
        user_id: &str,
        include_archived: bool,
    ) -> Result<Vec<Conversation>> {
        Ok(ConversationRepository::list_for_user(&self.pool, user_id, include_archived).await?)
    }

    pub async fn set_archived(
        &self,
        user_id: &str,
        conversation_id: &str,
        archived: bool,
    ) -> Result<()> {
        self.owned(user_id, conversation_id).await?;
        ConversationRepository::set_archived(&self.pool, conversation_id, archived).await?;
        Ok(())
    }

    pub async fn rename(&self, user_id: &str, conversation_id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(PlatformError::validation(
                "conversation title must not be empty",
            ));
        }
        self.owned(user_id, conversation_id).await?;
        ConversationRepository::update_title(&self.pool, conversation_id, title).await?;
        Ok(())
    }

    /// Delete a conversation and its messages
    pub async fn delete_conversation(&self, user_id: &str, conversation_id: &str) -> Result<()> {
        self.owned(user_id, conversation_id).await?;
        ConversationRepository::delete(&self.pool, conversation_id).await?;
        info!(conversation_id, user_id, "conversation deleted");
        Ok(())
    }

    /// One complete chat turn; returns the persisted assistant message.
    ///
    /// The user message and the auto-title are persisted before the model
    /// call, so a failed call still leaves the user's side of the exchange
    /// in history (and the counters stale until the next successful turn
    /// recomputes them).
    pub async fn send_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        content: &str,
        options: SendOptions,
    ) -> Result<ConversationMessage> {
        let conversation = self.owned(user_id, conversation_id).await?;
        let settings = TurnSettings::merge(&conversation, &options);

        let user_message = self.append_user(conversation_id, content).await?;
        self.auto_title(&conversation, content).await?;

        let model = self
            .gateway
            .resolve(
                options.model.as_deref(),
                settings.conversation_model.as_deref(),
            )
            .await?;
        let messages = self
            .build_context(user_id, conversation_id, content, &settings)
            .await?;

        let outcome = self
            .gateway
            .call(
                user_id,
                &model,
                messages,
                call_options(conversation_id, &settings),
            )
            .await?;

        let assistant_message = MessageRepository::create(
            &self.pool,
            ConversationMessage::new(
                Uuid::new_v4().to_string(),
                conversation_id.to_string(),
                MessageRole::Assistant.as_str().to_string(),
                outcome.content,
            )
            .with_model(model.id.clone())
            .with_usage(outcome.input_tokens, outcome.output_tokens, outcome.cost)
            .with_latency(outcome.response_time_ms),
        )
        .await?;

        self.finish_turn(user_id, conversation_id, &user_message, &assistant_message)
            .await?;

        info!(
            conversation_id,
            user_id,
            model = %model.full_identifier(),
            cost = outcome.cost,
            "chat turn completed"
        );
        Ok(assistant_message)
    }

    /// Streaming chat turn.
    ///
    /// The user message, title, and context are handled up front; the
    /// assistant message, counters, and memories are written when the
    /// returned stream finishes. Dropping the stream early abandons the
    /// assistant side of the exchange; a mid-stream provider error is
    /// yielded and ends the stream with nothing persisted.
    pub async fn stream_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        content: &str,
        options: SendOptions,
    ) -> Result<ChatStream> {
        let conversation = self.owned(user_id, conversation_id).await?;
        let settings = TurnSettings::merge(&conversation, &options);

        let user_message = self.append_user(conversation_id, content).await?;
        self.auto_title(&conversation, content).await?;

        let model = self
            .gateway
            .resolve(
                options.model.as_deref(),
                settings.conversation_model.as_deref(),
            )
            .await?;
        let messages = self
            .build_context(user_id, conversation_id, content, &settings)
            .await?;

        let started = Instant::now();
        let upstream = self
            .gateway
            .stream(
                user_id,
                &model,
                messages,
                call_options(conversation_id, &settings),
            )
            .await?;

        let service = self.clone();
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();

        let stream = async_stream::stream! {
            let mut upstream = upstream;
            let mut content = String::new();
            let mut usage = TokenUsage::default();

            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(chunk) => {
                        content.push_str(&chunk.content_delta);
                        if let Some(so_far) = chunk.usage_so_far {
                            usage = so_far;
                        }
                        yield Ok(chunk);
                    }
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }

            let cost = model.calculate_cost(usage.input_tokens, usage.output_tokens);
            let row = ConversationMessage::new(
                Uuid::new_v4().to_string(),
                conversation_id.clone(),
                MessageRole::Assistant.as_str().to_string(),
                content,
            )
            .with_model(model.id.clone())
            .with_usage(usage.input_tokens, usage.output_tokens, cost)
            .with_latency(started.elapsed().as_millis() as i64);

            match MessageRepository::create(&service.pool, row).await {
                Ok(assistant_message) => {
                    if let Err(err) = service
                        .finish_turn(&user_id, &conversation_id, &user_message, &assistant_message)
                        .await
                    {
                        error!(conversation_id, error = %err, "failed to finish streamed turn");
                    } else {
                        info!(
                            conversation_id,
                            user_id,
                            model = %model.full_identifier(),
                            cost,
                            "streamed chat turn completed"
                        );
                    }
                }
                Err(err) => {
                    error!(conversation_id, error = %err, "failed to persist streamed reply");
                }
            }
        };

        Ok(stream.boxed())
    }

    /// Ownership gate every public operation goes through
    async fn owned(&self, user_id: &str, conversation_id: &str) -> Result<Conversation> {
        ConversationRepository::get_for_user(&self.pool, conversation_id, user_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("conversation {conversation_id}")))
    }

    async fn append_user(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<ConversationMessage> {
        let message = ConversationMessage::new(
            Uuid::new_v4().to_string(),
            conversation_id.to_string(),
            MessageRole::User.as_str().to_string(),
            content.to_string(),
        );
        Ok(MessageRepository::create(&self.pool, message).await?)
    }

    /// The first user message becomes the title, clipped to 50 characters
    async fn auto_title(&self, conversation: &Conversation, content: &str) -> Result<()> {
        if conversation.title.is_some() {
            return Ok(());
        }
        ConversationRepository::update_title(&self.pool, &conversation.id, &title_from(content))
            .await?;
        Ok(())
    }

    /// Assemble the model context: optional system prompt, recalled memories
    /// as one synthetic system message, then the recent history (which
    /// already includes the just-persisted user message).
    async fn build_context(
        &self,
        user_id: &str,
        conversation_id: &str,
        query: &str,
        settings: &TurnSettings,
    ) -> Result<Vec<ChatMessage>> {
        let mut messages = Vec::new();

        if let Some(prompt) = &settings.system_prompt {
            messages.push(ChatMessage::system(prompt.clone()));
        }

        let scope = memory_scope(conversation_id);
        let memories = self
            .memory
            .retrieve_relevant(user_id, query, Some(&scope), MEMORY_RECALL_LIMIT)
            .await?;
        if !memories.is_empty() {
            messages.push(ChatMessage::system(format_memories(&memories)));
        }

        let history = MessageRepository::recent_for_context(
            &self.pool,
            conversation_id,
            settings.max_context_messages,
        )
        .await?;
        for message in &history {
            messages.push(to_chat_message(message));
        }

        Ok(messages)
    }

    /// Post-reply bookkeeping shared by both turn variants
    async fn finish_turn(
        &self,
        user_id: &str,
        conversation_id: &str,
        user_message: &ConversationMessage,
        assistant_message: &ConversationMessage,
    ) -> Result<()> {
        ConversationRepository::recalculate_counters(&self.pool, conversation_id).await?;
        self.remember_exchange(user_id, conversation_id, user_message, assistant_message)
            .await
    }

    /// Short-term record of the exchange plus any extracted durable facts
    async fn remember_exchange(
        &self,
        user_id: &str,
        conversation_id: &str,
        user_message: &ConversationMessage,
        assistant_message: &ConversationMessage,
    ) -> Result<()> {
        let scope = memory_scope(conversation_id);

        self.memory
            .store(
                user_id,
                MemoryType::ShortTerm,
                &format!("exchange_{}", user_message.id),
                &format!(
                    "User: {}\nAssistant: {}",
                    user_message.content, assistant_message.content
                ),
                StoreOptions::default()
                    .with_context(scope.clone())
                    .with_importance(EXCHANGE_IMPORTANCE),
            )
            .await?;

        for fact in extract::extract_facts(&user_message.content) {
            self.memory
                .store(
                    user_id,
                    MemoryType::LongTerm,
                    &fact.key,
                    &fact.value,
                    StoreOptions::default()
                        .with_context(scope.clone())
                        .with_importance(fact.importance),
                )
                .await?;
        }

        Ok(())
    }
}

/// Memory scope key shared by recall and the exchange writes
fn memory_scope(conversation_id: &str) -> String {
    format!("conversation_{conversation_id}")
}

fn call_options(conversation_id: &str, settings: &TurnSettings) -> CallOptions {
    let mut options = CallOptions::default().with_conversation(conversation_id);
    if let Some(temperature) = settings.temperature {
        options = options.with_temperature(temperature);
    }
    if let Some(max_tokens) = settings.max_tokens {
        options = options.with_max_tokens(max_tokens);
    }
    options
}

/// One system message carrying the recalled memories, one per line
fn format_memories(memories: &[RetrievedMemory]) -> String {
    let mut text = String::from("Relevant memories:\n");
    for memory in memories {
        let line = match &memory.value {
            Value::String(value) => value.clone(),
            value => value.to_string(),
        };
        text.push_str("- ");
        text.push_str(&line);
        text.push('\n');
    }
    text
}

/// Map a stored row back to the wire shape; unknown roles read as user text
fn to_chat_message(message: &ConversationMessage) -> ChatMessage {
    match MessageRole::parse(&message.role) {
        Some(MessageRole::System) => ChatMessage::system(message.content.clone()),
        Some(MessageRole::Assistant) => ChatMessage::assistant(message.content.clone()),
        _ => ChatMessage::user(message.content.clone()),
    }
}

fn title_from(content: &str) -> String {
    let mut chars = content.chars();
    let title: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{title}...")
    } else {
        title
    }
}
