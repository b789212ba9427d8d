//! Database models
//!
//! Row types for the platform tables. All timestamp fields are stored as
//! RFC 3339 strings (TEXT in SQLite) due to sqlx and SQLite type limitations
//! with chrono::DateTime<Utc>.

pub mod ai_model;
pub mod chunk;
pub mod conversation;
pub mod document;
pub mod execution;
pub mod execution_log;
pub mod knowledge_base;
pub mod memory;
pub mod message;
pub mod usage_log;
pub mod workflow;

pub use ai_model::AiModel;
pub use chunk::KnowledgeChunk;
pub use conversation::Conversation;
pub use document::KnowledgeDocument;
pub use execution::WorkflowExecution;
pub use execution_log::WorkflowExecutionLog;
pub use knowledge_base::KnowledgeBase;
pub use memory::Memory;
pub use message::ConversationMessage;
pub use usage_log::UsageLog;
pub use workflow::Workflow;
