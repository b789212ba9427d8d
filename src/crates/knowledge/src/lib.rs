//! Knowledge base pipeline for the agentry platform.
//!
//! Turns uploaded documents into retrievable chunks:
//!
//! - [`chunker`] — sliding-window text splitting with overlap
//! - [`parser`] — extension-keyed extraction of plain text from uploads
//! - [`embedding`] — caching, batching client over an external
//!   [`EmbeddingProvider`](embedding::EmbeddingProvider)
//! - [`vector`] — pluggable nearest-neighbor storage with an in-memory
//!   reference backend
//! - [`files`] — on-disk storage for the raw uploads
//! - [`service`] — the pipeline itself: ingest, process, search, delete
//!
//! External capabilities (embedding provider, vector backend, parsers) are
//! injected traits; swapping a hosted vector database for the in-memory
//! backend is a registry entry, not a code change.

pub mod chunker;
pub mod config;
pub mod embedding;
pub mod files;
pub mod parser;
pub mod service;
pub mod vector;

pub use chunker::{chunk_text, estimate_tokens, Chunk};
pub use config::{KnowledgeConfig, SearchOptions, SearchSettings};
pub use embedding::{cosine_similarity, EmbeddingClient, EmbeddingProvider};
pub use files::FileStore;
pub use parser::{DocumentParser, ParserRegistry};
pub use service::{
    CreateKnowledgeBase, KnowledgeBaseStatistics, KnowledgeService, Reranker, SearchResult,
    UpdateKnowledgeBase,
};
pub use vector::{BackendRegistry, InMemoryVectorBackend, SearchHit, VectorBackend};
