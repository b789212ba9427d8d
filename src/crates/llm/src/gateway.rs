//! Model gateway: the single path for every outbound model call.
//!
//! The gateway resolves which catalog row serves a request, applies the
//! per-user rate limit before any provider work, dispatches to the registered
//! [`LanguageModel`] for the row's provider, prices the response from the
//! row, and writes a [`UsageLog`] entry for success and failure alike. No
//! other crate talks to a provider directly.

use std::collections::HashMap;
use std::time::Instant;

use futures::StreamExt;
use tracing::{error, info};
use uuid::Uuid;

use platform::llm::{ChatMessage, ChatRequest, ChatStream, LanguageModel, TokenUsage};
use platform::{PlatformError, RateLimiter, Result};
use storage::models::{AiModel, UsageLog};
use storage::repositories::{AiModelRepository, UsageLogRepository};
use storage::DatabasePool;

/// Operation tag for complete chat calls
pub const OPERATION_CHAT: &str = "chat";

/// Operation tag for streaming chat calls
pub const OPERATION_CHAT_STREAM: &str = "chat_stream";

/// Operation tag for calls made on behalf of a workflow node
pub const OPERATION_WORKFLOW: &str = "workflow";

/// Optional knobs for one gateway call
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Sampling temperature; defaults to 0.7
    pub temperature: Option<f64>,
    /// Completion token budget; defaults to 2048
    pub max_tokens: Option<i64>,
    /// Conversation to attribute the usage row to
    pub conversation_id: Option<String>,
    /// Usage-log operation tag; defaults to `chat` / `chat_stream`
    pub operation: Option<String>,
}

impl CallOptions {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }
}

/// Everything a caller needs from a completed call
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub content: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost: f64,
    pub response_time_ms: i64,
    pub request_id: String,
}

/// Gateway over the registered providers, the rate limiter, and the pool
pub struct ModelGateway {
    pool: DatabasePool,
    providers: HashMap<String, Box<dyn LanguageModel>>,
    limiter: RateLimiter,
}

impl ModelGateway {
    pub fn new(pool: DatabasePool, limiter: RateLimiter) -> Self {
        Self {
            pool,
            providers: HashMap::new(),
            limiter,
        }
    }

    /// Register the model implementation serving one provider key
    /// (e.g. "openai"). Replaces any previous registration for that key.
    pub fn register(&mut self, provider: impl Into<String>, model: Box<dyn LanguageModel>) {
        self.providers.insert(provider.into(), model);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_provider(mut self, provider: impl Into<String>, model: Box<dyn LanguageModel>) -> Self {
        self.register(provider, model);
        self
    }

    /// Pick the model row for a request: explicit id, then the conversation
    /// default, then the system default row.
    ///
    /// Inactive and unknown candidates fall through silently; only an empty
    /// catalog (no usable default) is an error.
    pub async fn resolve(
        &self,
        explicit: Option<&str>,
        conversation_default: Option<&str>,
    ) -> Result<AiModel> {
        for candidate in [explicit, conversation_default].into_iter().flatten() {
            if let Some(model) =
                AiModelRepository::find_active_by_model_id(&self.pool, candidate).await?
            {
                return Ok(model);
            }
        }

        AiModelRepository::get_default(&self.pool)
            .await?
            .ok_or_else(|| PlatformError::NotFound("active default model".to_string()))
    }

    /// Complete chat call.
    ///
    /// Counts against the caller's rate limit, dispatches, prices the
    /// response from the model row, and writes the usage row. A failed call
    /// (rate limit included) writes a failure row carrying the error.
    pub async fn call(
        &self,
        user_id: &str,
        model: &AiModel,
        messages: Vec<ChatMessage>,
        options: CallOptions,
    ) -> Result<CallOutcome> {
        let request_id = next_request_id();
        let operation = options.operation.as_deref().unwrap_or(OPERATION_CHAT);
        let started = Instant::now();

        let attempt = self.dispatch(user_id, model, messages, &options).await;
        let response_time_ms = started.elapsed().as_millis() as i64;

        match attempt {
            Ok(response) => {
                let cost = model.calculate_cost(response.usage.input_tokens, response.usage.output_tokens);
                let log = self
                    .base_log(user_id, model, &request_id, operation, &options)
                    .with_usage(response.usage.input_tokens, response.usage.output_tokens, cost)
                    .with_response_time(response_time_ms);
                UsageLogRepository::create(&self.pool, log).await?;

                info!(
                    user_id,
                    model = %model.full_identifier(),
                    request_id,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    cost,
                    response_time_ms,
                    "model call completed"
                );

                Ok(CallOutcome {
                    content: response.content,
                    input_tokens: response.usage.input_tokens,
                    output_tokens: response.usage.output_tokens,
                    cost,
                    response_time_ms,
                    request_id,
                })
            }
            Err(err) => {
                let log = self
                    .base_log(user_id, model, &request_id, operation, &options)
                    .with_response_time(response_time_ms)
                    .failed(err.to_string());
                if let Err(log_err) = UsageLogRepository::create(&self.pool, log).await {
                    error!(request_id, error = %log_err, "failed to record usage for failed call");
                }

                error!(
                    user_id,
                    model = %model.full_identifier(),
                    request_id,
                    error = %err,
                    "model call failed"
                );
                Err(err)
            }
        }
    }

    /// Streaming chat call.
    ///
    /// Admission control and dispatch run up front, so limit and provider
    /// errors surface before any chunk. The returned stream is finite and
    /// not restartable; the usage row is written when it finishes (chunks
    /// carry cumulative usage, the row prices whatever the last chunk
    /// reported). A consumer that drops the stream early abandons the row,
    /// like an abandoned reference call.
    pub async fn stream(
        &self,
        user_id: &str,
        model: &AiModel,
        messages: Vec<ChatMessage>,
        options: CallOptions,
    ) -> Result<ChatStream> {
        let request_id = next_request_id();
        let operation = options
            .operation
            .clone()
            .unwrap_or_else(|| OPERATION_CHAT_STREAM.to_string());
        let started = Instant::now();

        let upstream = match self.dispatch_stream(user_id, model, messages, &options).await {
            Ok(stream) => stream,
            Err(err) => {
                let log = self
                    .base_log(user_id, model, &request_id, &operation, &options)
                    .with_response_time(started.elapsed().as_millis() as i64)
                    .failed(err.to_string());
                if let Err(log_err) = UsageLogRepository::create(&self.pool, log).await {
                    error!(request_id, error = %log_err, "failed to record usage for failed stream");
                }
                return Err(err);
            }
        };

        let pool = self.pool.clone();
        let model = model.clone();
        let user_id = user_id.to_string();
        let conversation_id = options.conversation_id.clone();

        let stream = async_stream::stream! {
            let mut upstream = upstream;
            let mut usage = TokenUsage::default();
            let mut failure: Option<String> = None;

            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(chunk) => {
                        if let Some(so_far) = chunk.usage_so_far {
                            usage = so_far;
                        }
                        yield Ok(chunk);
                    }
                    Err(err) => {
                        failure = Some(err.to_string());
                        yield Err(err);
                        break;
                    }
                }
            }

            let response_time_ms = started.elapsed().as_millis() as i64;
            let cost = model.calculate_cost(usage.input_tokens, usage.output_tokens);
            let mut log = UsageLog::new(
                Uuid::new_v4().to_string(),
                user_id.clone(),
                model.id.clone(),
                request_id.clone(),
                operation.clone(),
            )
            .with_usage(usage.input_tokens, usage.output_tokens, cost)
            .with_response_time(response_time_ms);
            if let Some(conversation_id) = &conversation_id {
                log = log.with_conversation(conversation_id.clone());
            }
            if let Some(message) = failure {
                log = log.failed(message);
            }

            if let Err(err) = UsageLogRepository::create(&pool, log).await {
                error!(request_id, error = %err, "failed to record stream usage");
            } else {
                info!(
                    user_id,
                    model = %model.full_identifier(),
                    request_id,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    cost,
                    response_time_ms,
                    "model stream finished"
                );
            }
        };

        Ok(stream.boxed())
    }

    async fn dispatch(
        &self,
        user_id: &str,
        model: &AiModel,
        messages: Vec<ChatMessage>,
        options: &CallOptions,
    ) -> Result<platform::llm::ChatResponse> {
        self.limiter.check_and_increment(user_id, &model.id)?;
        let provider = self.provider(&model.provider)?;
        provider.chat(build_request(model, messages, options)).await
    }

    async fn dispatch_stream(
        &self,
        user_id: &str,
        model: &AiModel,
        messages: Vec<ChatMessage>,
        options: &CallOptions,
    ) -> Result<ChatStream> {
        self.limiter.check_and_increment(user_id, &model.id)?;
        if !model.supports_streaming {
            return Err(PlatformError::validation(format!(
                "model {} does not support streaming",
                model.full_identifier()
            )));
        }
        let provider = self.provider(&model.provider)?;
        provider.stream(build_request(model, messages, options)).await
    }

    fn provider(&self, name: &str) -> Result<&dyn LanguageModel> {
        self.providers
            .get(name)
            .map(|boxed| boxed.as_ref())
            .ok_or_else(|| PlatformError::Config(format!("no provider registered for '{name}'")))
    }

    fn base_log(
        &self,
        user_id: &str,
        model: &AiModel,
        request_id: &str,
        operation: &str,
        options: &CallOptions,
    ) -> UsageLog {
        let mut log = UsageLog::new(
            Uuid::new_v4().to_string(),
            user_id.to_string(),
            model.id.clone(),
            request_id.to_string(),
            operation.to_string(),
        );
        if let Some(conversation_id) = &options.conversation_id {
            log = log.with_conversation(conversation_id.clone());
        }
        log
    }
}

fn build_request(model: &AiModel, messages: Vec<ChatMessage>, options: &CallOptions) -> ChatRequest {
    let mut request = ChatRequest::new(model.model_id.clone(), messages);
    if let Some(temperature) = options.temperature {
        request = request.with_temperature(temperature);
    }
    if let Some(max_tokens) = options.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    request
}

fn next_request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}
