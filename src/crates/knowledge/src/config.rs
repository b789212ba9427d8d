//! Knowledge pipeline configuration.
//!
//! Defaults mirror the shipped embedding-model catalog and processing limits;
//! every field can be overridden through serde (JSON settings documents).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Catalog entry for one embedding model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingModelInfo {
    /// Provider name, e.g. "openai"
    pub provider: String,
    /// Vector length produced by the model
    pub dimensions: usize,
    /// Largest input the model accepts, in tokens
    pub max_tokens: usize,
    /// Price per 1000 input tokens in USD
    pub cost_per_1k_tokens: f64,
}

/// Embedding generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model used when a knowledge base does not pick one
    #[serde(default = "default_embedding_model")]
    pub default_model: String,
    /// Known models keyed by model name
    #[serde(default = "builtin_embedding_models")]
    pub models: HashMap<String, EmbeddingModelInfo>,
    /// Texts per provider call when batching
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Embedding cache lifetime in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            default_model: default_embedding_model(),
            models: builtin_embedding_models(),
            batch_size: default_batch_size(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Document ingestion limits and chunking geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Largest accepted upload in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    /// File extensions accepted for ingestion
    #[serde(default = "default_supported_formats")]
    pub supported_formats: Vec<String>,
    /// Window length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive windows
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Smallest window a knowledge base may configure
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
    /// Largest window a knowledge base may configure
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            supported_formats: default_supported_formats(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_chunk_size: default_min_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
        }
    }
}

/// Retrieval defaults applied when neither the call nor the knowledge base
/// overrides them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Hard cap on hits per search regardless of overrides
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    /// Minimum similarity score for a hit to count
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_true")]
    pub rerank_enabled: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            similarity_threshold: default_similarity_threshold(),
            rerank_enabled: true,
        }
    }
}

/// Complete knowledge pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Vector backend used when a knowledge base does not pick one
    #[serde(default = "default_vector_backend")]
    pub default_vector_backend: String,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            default_vector_backend: default_vector_backend(),
            embedding: EmbeddingConfig::default(),
            processing: ProcessingConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl KnowledgeConfig {
    /// Look up a model in the embedding catalog
    pub fn model_info(&self, model: &str) -> Option<&EmbeddingModelInfo> {
        self.embedding.models.get(model)
    }

    /// Whether a file extension is accepted for ingestion (case-insensitive)
    pub fn supports_format(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.processing
            .supported_formats
            .iter()
            .any(|f| f == &extension)
    }

    /// Check chunk geometry against the configured bounds.
    ///
    /// Returns every violation so callers can report them all at once.
    /// `overlap < size` is the invariant that keeps the chunker's window
    /// advance positive.
    pub fn validate_chunk_geometry(&self, size: i64, overlap: i64) -> Vec<String> {
        let mut errors = Vec::new();

        if size < self.processing.min_chunk_size as i64 {
            errors.push(format!(
                "chunk_size must be at least {}",
                self.processing.min_chunk_size
            ));
        }
        if size > self.processing.max_chunk_size as i64 {
            errors.push(format!(
                "chunk_size must be at most {}",
                self.processing.max_chunk_size
            ));
        }
        if overlap < 0 {
            errors.push("chunk_overlap must not be negative".to_string());
        }
        if overlap >= size {
            errors.push("chunk_overlap must be less than chunk_size".to_string());
        }

        errors
    }
}

/// Per-knowledge-base retrieval overrides stored in the `settings` JSON column.
///
/// Only fields actually present in the document override; everything else
/// falls through to [`RetrievalConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_enabled: Option<bool>,
    /// Recorded for forward compatibility; only similarity search ships
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_strategy: Option<String>,
}

impl SearchSettings {
    /// Decode from the settings column, treating malformed JSON as empty
    pub fn parse(json: &str) -> Self {
        serde_json::from_str(json).unwrap_or_default()
    }
}

/// Per-call search overrides, the highest-precedence layer
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub similarity_threshold: Option<f32>,
    pub rerank: Option<bool>,
}

fn default_vector_backend() -> String {
    "memory".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn builtin_embedding_models() -> HashMap<String, EmbeddingModelInfo> {
    let mut models = HashMap::new();
    models.insert(
        "text-embedding-ada-002".to_string(),
        EmbeddingModelInfo {
            provider: "openai".to_string(),
            dimensions: 1536,
            max_tokens: 8191,
            cost_per_1k_tokens: 0.0001,
        },
    );
    models.insert(
        "text-embedding-3-small".to_string(),
        EmbeddingModelInfo {
            provider: "openai".to_string(),
            dimensions: 1536,
            max_tokens: 8191,
            cost_per_1k_tokens: 0.00002,
        },
    );
    models.insert(
        "text-embedding-3-large".to_string(),
        EmbeddingModelInfo {
            provider: "openai".to_string(),
            dimensions: 3072,
            max_tokens: 8191,
            cost_per_1k_tokens: 0.00013,
        },
    );
    models
}

fn default_batch_size() -> usize {
    100
}

fn default_cache_ttl_secs() -> i64 {
    86_400
}

fn default_max_file_size() -> usize {
    50 * 1024 * 1024
}

fn default_supported_formats() -> Vec<String> {
    ["txt", "md", "html", "csv", "json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_min_chunk_size() -> usize {
    100
}

fn default_max_chunk_size() -> usize {
    2000
}

fn default_top_k() -> usize {
    5
}

fn default_max_top_k() -> usize {
    20
}

fn default_similarity_threshold() -> f32 {
    0.7
}

fn default_true() -> bool {
    true
}
