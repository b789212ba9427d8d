//! Platform-wide error taxonomy.
//!
//! Service crates return [`Result`]; repositories return `sqlx::Error` directly
//! and conversion happens at the service boundary via `#[from]`.

use thiserror::Error;

/// Result type alias for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Unified error type for all platform operations
#[derive(Debug, Error)]
pub enum PlatformError {
    /// One or more validation failures. Carries the full list of violations so
    /// callers can report every problem at once.
    #[error("Validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    /// A document with the same content hash already exists in the knowledge base
    #[error("Duplicate document: hash {hash} already exists in knowledge base {knowledge_base_id}")]
    DuplicateDocument {
        knowledge_base_id: String,
        hash: String,
    },

    /// File extension has no registered parser
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Workflow node type has no registered handler
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Vectors of different lengths cannot be compared
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A condition expression failed to parse or evaluate
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    /// Fixed-window rate limit exhausted
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: i64 },

    /// An injected capability (LLM, embedding, vector backend) failed
    #[error("{capability} call failed: {message}")]
    ExternalCall { capability: String, message: String },

    /// Entity lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Illegal status transition
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Operation exceeded its wall-clock budget
    #[error("Timed out after {elapsed_secs}s (limit {limit_secs}s)")]
    Timeout { elapsed_secs: u64, limit_secs: u64 },

    /// Bad wiring or configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlatformError {
    /// Single-message validation failure
    pub fn validation(msg: impl Into<String>) -> Self {
        PlatformError::Validation {
            errors: vec![msg.into()],
        }
    }

    /// External-capability failure with context
    pub fn external(capability: impl Into<String>, message: impl Into<String>) -> Self {
        PlatformError::ExternalCall {
            capability: capability.into(),
            message: message.into(),
        }
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound(_))
    }

    /// Errors a caller may reasonably retry after a delay
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::RateLimitExceeded { .. }
                | PlatformError::ExternalCall { .. }
                | PlatformError::Timeout { .. }
        )
    }
}
