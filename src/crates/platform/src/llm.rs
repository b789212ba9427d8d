//! Provider-agnostic language model capability.
//!
//! The platform is an orchestration layer, not an LLM client library: the
//! crates here never speak HTTP to a provider. Instead, embedding applications
//! implement [`LanguageModel`] for their providers (OpenAI, Anthropic, local
//! inference, ...) and register the implementations with the model gateway.
//! The trait is intentionally minimal: a complete chat call, a streaming
//! variant, and a health probe.
//!
//! Implementations must be `Send + Sync`; share them as
//! `Arc<dyn LanguageModel>` or clone boxed objects via [`LanguageModel::clone_box`].

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// String form used in persistence and wire payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    /// Parse from the persisted string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(MessageRole::System),
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One message in a chat exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Default sampling temperature applied when the caller gives none
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Default completion token budget applied when the caller gives none
pub const DEFAULT_MAX_TOKENS: i64 = 2048;

/// A complete request to a language model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Provider-side model identifier (e.g. "gpt-3.5-turbo")
    pub model_id: String,
    /// Ordered conversation context, oldest first
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: i64,
}

impl ChatRequest {
    /// Create a request with the platform defaults (temperature 0.7,
    /// max_tokens 2048)
    pub fn new(model_id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model_id: model_id.into(),
            messages,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Override the sampling temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the completion token budget
    pub fn with_max_tokens(mut self, max_tokens: i64) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Token accounting reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl TokenUsage {
    pub fn new(input_tokens: i64, output_tokens: i64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }
}

/// A complete (non-streaming) model response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// One incremental piece of a streaming response.
///
/// Providers emit deltas in order; the final chunk usually carries the
/// cumulative usage. A stream is finite and not restartable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content_delta: String,
    pub usage_so_far: Option<TokenUsage>,
}

/// A lazy, ordinally ordered, finite stream of response chunks
pub type ChatStream = BoxStream<'static, Result<StreamChunk>>;

/// Core capability trait for chat-based language models.
///
/// Implementations handle provider specifics: authentication, request
/// translation, and response parsing. Failures should surface as
/// [`PlatformError::ExternalCall`](crate::error::PlatformError::ExternalCall)
/// with the provider named as the capability.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a complete response for the request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Stream a response incrementally.
    ///
    /// The returned stream ends after the final chunk; dropping it cancels
    /// upstream consumption.
    async fn stream(&self, request: ChatRequest) -> Result<ChatStream>;

    /// Probe provider availability. Defaults to available.
    async fn is_available(&self) -> Result<bool> {
        Ok(true)
    }

    /// Clone this model into a boxed trait object.
    fn clone_box(&self) -> Box<dyn LanguageModel>;
}

/// Enable cloning for boxed LanguageModel trait objects.
impl Clone for Box<dyn LanguageModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;

    /// Mock model for exercising trait usage patterns.
    #[derive(Clone)]
    struct MockModel {
        response_text: String,
    }

    #[async_trait]
    impl LanguageModel for MockModel {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: self.response_text.clone(),
                usage: TokenUsage::new(10, 5),
            })
        }

        async fn stream(&self, _request: ChatRequest) -> Result<ChatStream> {
            let chunks = vec![
                Ok(StreamChunk {
                    content_delta: self.response_text.clone(),
                    usage_so_far: None,
                }),
                Ok(StreamChunk {
                    content_delta: String::new(),
                    usage_so_far: Some(TokenUsage::new(10, 5)),
                }),
            ];
            Ok(futures::stream::iter(chunks).boxed())
        }

        fn clone_box(&self) -> Box<dyn LanguageModel> {
            Box::new(self.clone())
        }
    }

    #[tokio::test]
    async fn test_trait_object_chat() {
        let model: Arc<dyn LanguageModel> = Arc::new(MockModel {
            response_text: "Hello!".to_string(),
        });

        let request = ChatRequest::new("mock-model", vec![ChatMessage::user("Hi")]);
        let response = model.chat(request).await.unwrap();

        assert_eq!(response.content, "Hello!");
        assert_eq!(response.usage.total(), 15);
    }

    #[tokio::test]
    async fn test_stream_yields_chunks_in_order() {
        let model = MockModel {
            response_text: "streamed".to_string(),
        };

        let request = ChatRequest::new("mock-model", vec![ChatMessage::user("Hi")]);
        let mut stream = model.stream(request).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.content_delta, "streamed");
        assert!(first.usage_so_far.is_none());

        let last = stream.next().await.unwrap().unwrap();
        assert_eq!(last.usage_so_far.unwrap().output_tokens, 5);

        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_default_is_available() {
        let model = MockModel {
            response_text: "x".to_string(),
        };
        assert!(model.is_available().await.unwrap());
    }

    #[test]
    fn test_request_defaults_and_builders() {
        let request = ChatRequest::new("gpt-3.5-turbo", vec![]);
        assert_eq!(request.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(request.max_tokens, DEFAULT_MAX_TOKENS);

        let request = request.with_temperature(0.2).with_max_tokens(512);
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, 512);
    }

    #[test]
    fn test_role_round_trip() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            assert_eq!(MessageRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(MessageRole::parse("tool"), None);
    }

    #[test]
    fn test_boxed_model_clone() {
        let boxed: Box<dyn LanguageModel> = Box::new(MockModel {
            response_text: "x".to_string(),
        });
        let _cloned = boxed.clone();
    }
}
