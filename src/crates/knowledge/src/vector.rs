//! Vector store abstraction and the in-memory reference backend.
//!
//! Backends register under a name; a knowledge base's `vector_backend` column
//! selects one at run time, so switching stores is pure configuration. The
//! shipped backend is a brute-force cosine scan over process memory; real
//! network stores implement the same trait.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use platform::{PlatformError, Result};
use storage::models::KnowledgeBase;

use crate::embedding::cosine_similarity;

/// One scored match from a backend search
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub vector_id: String,
    pub score: f32,
    pub metadata: Value,
}

/// Pluggable vector store.
///
/// Threshold filtering and descending sort happen inside the backend so
/// network implementations can push both down to the server.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Registry key, e.g. "memory"
    fn name(&self) -> &str;

    /// Prepare storage for a knowledge base
    async fn create_index(&self, kb: &KnowledgeBase) -> Result<()>;

    /// Store one vector with its metadata, returning the backend's id for it
    async fn store(&self, kb: &KnowledgeBase, vector: Vec<f32>, metadata: Value)
        -> Result<String>;

    /// Nearest neighbors of `query`: at most `top_k` hits scoring at least
    /// `threshold`, best first
    async fn search(
        &self,
        kb: &KnowledgeBase,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>>;

    /// Remove one vector; unknown ids are a no-op
    async fn delete(&self, kb: &KnowledgeBase, vector_id: &str) -> Result<()>;
}

/// Name-keyed collection of registered backends.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn VectorBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the in-memory backend
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(InMemoryVectorBackend::new()));
        registry
    }

    /// Register a backend under its own name, replacing any previous entry
    pub fn register(&mut self, backend: Arc<dyn VectorBackend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Resolve a backend by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn VectorBackend>> {
        self.backends.get(name).cloned().ok_or_else(|| {
            PlatformError::Config(format!("vector backend '{name}' is not registered"))
        })
    }
}

struct StoredVector {
    vector: Vec<f32>,
    metadata: Value,
}

/// Brute-force in-memory backend; the built-in backend and test double.
///
/// One index per knowledge base, named `kb-{id}`. Search scans every stored
/// vector, which is fine for the collection sizes tests and small deployments
/// use.
#[derive(Default)]
pub struct InMemoryVectorBackend {
    indexes: RwLock<HashMap<String, HashMap<String, StoredVector>>>,
}

impl InMemoryVectorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored vector count for a knowledge base; 0 when the index is missing
    pub fn count(&self, kb: &KnowledgeBase) -> usize {
        self.indexes
            .read()
            .get(&index_name(kb))
            .map_or(0, |index| index.len())
    }
}

fn index_name(kb: &KnowledgeBase) -> String {
    format!("kb-{}", kb.id)
}

#[async_trait]
impl VectorBackend for InMemoryVectorBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_index(&self, kb: &KnowledgeBase) -> Result<()> {
        self.indexes
            .write()
            .entry(index_name(kb))
            .or_insert_with(HashMap::new);
        Ok(())
    }

    async fn store(
        &self,
        kb: &KnowledgeBase,
        vector: Vec<f32>,
        metadata: Value,
    ) -> Result<String> {
        let name = index_name(kb);
        let mut indexes = self.indexes.write();
        let index = indexes
            .get_mut(&name)
            .ok_or_else(|| PlatformError::NotFound(format!("vector index {name}")))?;

        let vector_id = Uuid::new_v4().to_string();
        index.insert(vector_id.clone(), StoredVector { vector, metadata });
        Ok(vector_id)
    }

    async fn search(
        &self,
        kb: &KnowledgeBase,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        let name = index_name(kb);
        let indexes = self.indexes.read();
        let index = indexes
            .get(&name)
            .ok_or_else(|| PlatformError::NotFound(format!("vector index {name}")))?;

        let mut hits = Vec::new();
        for (vector_id, stored) in index.iter() {
            let score = cosine_similarity(query, &stored.vector)?;
            if score >= threshold {
                hits.push(SearchHit {
                    vector_id: vector_id.clone(),
                    score,
                    metadata: stored.metadata.clone(),
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, kb: &KnowledgeBase, vector_id: &str) -> Result<()> {
        let name = index_name(kb);
        let mut indexes = self.indexes.write();
        let index = indexes
            .get_mut(&name)
            .ok_or_else(|| PlatformError::NotFound(format!("vector index {name}")))?;

        index.remove(vector_id);
        Ok(())
    }
}
