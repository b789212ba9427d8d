//! Shared platform types for the agentry workspace.
//!
//! Every other crate in the workspace depends on this one. It holds the
//! pieces that cut across domains:
//!
//! - [`error`] — the unified [`PlatformError`] taxonomy and [`Result`] alias
//! - [`llm`] — the provider-agnostic [`LanguageModel`](llm::LanguageModel)
//!   capability trait and its request/response types
//! - [`cache`] — a TTL key/value store trait with an in-memory implementation,
//!   backing the embedding cache and the rate limiter
//! - [`ratelimit`] — a fixed-window rate limiter keyed by (user, model)
//! - [`telemetry`] — tracing subscriber setup for binaries and tests
//!
//! The platform crate deliberately contains no domain logic: workflows,
//! knowledge bases, memories, and conversations live in their own crates.

pub mod cache;
pub mod error;
pub mod llm;
pub mod ratelimit;
pub mod telemetry;

pub use cache::{CacheStore, InMemoryCache};
pub use error::{PlatformError, Result};
pub use llm::{
    ChatMessage, ChatRequest, ChatResponse, ChatStream, LanguageModel, MessageRole, StreamChunk,
    TokenUsage,
};
pub use ratelimit::RateLimiter;
