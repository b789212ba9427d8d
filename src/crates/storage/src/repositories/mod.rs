//! Repository pattern implementations for database access
//!
//! This module provides repository structs for managing database operations
//! on all core entities: models, conversations, knowledge bases, memories,
//! workflows, executions, and usage logs.

pub mod ai_model_repo;
pub mod chunk_repo;
pub mod conversation_repo;
pub mod document_repo;
pub mod execution_log_repo;
pub mod execution_repo;
pub mod knowledge_base_repo;
pub mod memory_repo;
pub mod message_repo;
pub mod usage_log_repo;
pub mod workflow_repo;

// Re-export all repositories for convenient access
pub use ai_model_repo::AiModelRepository;
pub use chunk_repo::ChunkRepository;
pub use conversation_repo::ConversationRepository;
pub use document_repo::DocumentRepository;
pub use execution_log_repo::ExecutionLogRepository;
pub use execution_repo::ExecutionRepository;
pub use knowledge_base_repo::KnowledgeBaseRepository;
pub use memory_repo::{MemoryRepository, MemoryTypeStats};
pub use message_repo::MessageRepository;
pub use usage_log_repo::UsageLogRepository;
pub use workflow_repo::WorkflowRepository;
