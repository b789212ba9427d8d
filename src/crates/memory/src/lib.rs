//! Typed user memory for conversations and workflows.
//!
//! - [`service`]: store/retrieve, relevance retrieval, TTL cleanup, and
//!   short-term to long-term consolidation
//! - [`scoring`]: the lexical relevance heuristic behind retrieval

pub mod scoring;
pub mod service;

pub use service::{
    MemoryService, MemoryStatistics, MemoryType, RetrievedMemory, StoreOptions,
};
