//! Embedding client with caching and batching.
//!
//! [`EmbeddingProvider`] is the injected external capability; the client wraps
//! it with a TTL cache keyed by `embedding:{model}:{sha256(text)}` and splits
//! large inputs into provider-sized batches. Only cache misses reach the
//! provider; results merge back into the original input order.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, warn};

use platform::cache::CacheStore;
use platform::{PlatformError, Result};

use crate::config::EmbeddingConfig;

/// External embedding capability.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>>;

    /// Embed several texts in one call. Must return one vector per input, in
    /// input order.
    async fn embed_batch(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>>;

    fn clone_box(&self) -> Box<dyn EmbeddingProvider>;
}

impl Clone for Box<dyn EmbeddingProvider> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Cosine similarity between two vectors.
///
/// Errors on mismatched dimensions; a zero-norm vector scores 0.0 against
/// everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(PlatformError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (norm_a * norm_b))
}

/// Caching, batching front end over an [`EmbeddingProvider`].
pub struct EmbeddingClient {
    provider: Box<dyn EmbeddingProvider>,
    cache: Arc<dyn CacheStore>,
    config: EmbeddingConfig,
}

impl EmbeddingClient {
    pub fn new(
        provider: Box<dyn EmbeddingProvider>,
        cache: Arc<dyn CacheStore>,
        config: EmbeddingConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            config,
        }
    }

    /// The configured default model name
    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    /// Whether a model name is present in the catalog
    pub fn knows_model(&self, model: &str) -> bool {
        self.config.models.contains_key(model)
    }

    /// Embed one text, consulting the cache first.
    pub async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        self.require_model(model)?;

        let key = cache_key(model, text);
        if let Some(vector) = self.cached_vector(&key) {
            debug!(model, "Embedding cache hit");
            return Ok(vector);
        }

        let vector = self.provider.embed(text, model).await.map_err(|e| {
            error!(model, text_length = text.len(), error = %e, "Embedding generation failed");
            e
        })?;

        self.cache_vector(&key, &vector);
        Ok(vector)
    }

    /// Embed many texts, batching provider calls and preserving input order.
    pub async fn embed_batch(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        self.require_model(model)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = usize::max(self.config.batch_size, 1);
        let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

        for batch_start in (0..texts.len()).step_by(batch_size) {
            let batch_end = usize::min(batch_start + batch_size, texts.len());

            let mut miss_indices = Vec::new();
            let mut miss_texts = Vec::new();
            for i in batch_start..batch_end {
                match self.cached_vector(&cache_key(model, &texts[i])) {
                    Some(vector) => embeddings[i] = Some(vector),
                    None => {
                        miss_indices.push(i);
                        miss_texts.push(texts[i].clone());
                    }
                }
            }

            if miss_texts.is_empty() {
                continue;
            }

            let fresh = self
                .provider
                .embed_batch(&miss_texts, model)
                .await
                .map_err(|e| {
                    error!(model, batch = miss_texts.len(), error = %e, "Batch embedding failed");
                    e
                })?;

            if fresh.len() != miss_texts.len() {
                return Err(PlatformError::external(
                    "embedding",
                    format!(
                        "provider returned {} embeddings for {} inputs",
                        fresh.len(),
                        miss_texts.len()
                    ),
                ));
            }

            for (slot, vector) in miss_indices.into_iter().zip(fresh) {
                self.cache_vector(&cache_key(model, &texts[slot]), &vector);
                embeddings[slot] = Some(vector);
            }
        }

        embeddings
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    PlatformError::external("embedding", "batch merge left an input without a vector")
                })
            })
            .collect()
    }

    /// Cost of embedding `token_count` tokens with the given model, rounded
    /// to 6 decimal places. Unknown models cost nothing.
    pub fn embedding_cost(&self, model: &str, token_count: usize) -> f64 {
        match self.config.models.get(model) {
            Some(info) => round_cost(token_count as f64 / 1000.0 * info.cost_per_1k_tokens),
            None => {
                warn!(model, "Embedding cost requested for a model not in the catalog");
                0.0
            }
        }
    }

    fn require_model(&self, model: &str) -> Result<()> {
        if self.config.models.contains_key(model) {
            Ok(())
        } else {
            Err(PlatformError::Config(format!(
                "embedding model '{model}' is not in the catalog"
            )))
        }
    }

    fn cached_vector(&self, key: &str) -> Option<Vec<f32>> {
        let raw = self.cache.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(vector) => Some(vector),
            Err(_) => {
                // Undecodable entries are dropped and treated as misses
                self.cache.forget(key);
                None
            }
        }
    }

    fn cache_vector(&self, key: &str, vector: &[f32]) {
        if let Ok(encoded) = serde_json::to_string(vector) {
            self.cache
                .put(key, encoded, Some(self.config.cache_ttl_secs));
        }
    }
}

fn cache_key(model: &str, text: &str) -> String {
    format!("embedding:{}:{:x}", model, Sha256::digest(text.as_bytes()))
}

fn round_cost(cost: f64) -> f64 {
    (cost * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use platform::cache::InMemoryCache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn vector_for(text: &str) -> Vec<f32> {
        let first = text.chars().next().map(|c| c as u32 as f32).unwrap_or(0.0);
        vec![text.chars().count() as f32, first, 1.0]
    }

    #[derive(Clone, Default)]
    struct StubProvider {
        calls: Arc<AtomicUsize>,
        batch_sizes: Arc<Mutex<Vec<usize>>>,
        short_batch: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed(&self, text: &str, _model: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vector_for(text))
        }

        async fn embed_batch(&self, texts: &[String], _model: &str) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().push(texts.len());
            let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| vector_for(t)).collect();
            if self.short_batch {
                vectors.pop();
            }
            Ok(vectors)
        }

        fn clone_box(&self) -> Box<dyn EmbeddingProvider> {
            Box::new(self.clone())
        }
    }

    fn client(provider: StubProvider) -> EmbeddingClient {
        EmbeddingClient::new(
            Box::new(provider),
            Arc::new(InMemoryCache::new()),
            EmbeddingConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_embed_hits_cache_on_second_call() {
        let provider = StubProvider::default();
        let calls = provider.calls.clone();
        let client = client(provider);

        let first = client.embed("hello", "text-embedding-ada-002").await.unwrap();
        let second = client.embed("hello", "text-embedding-ada-002").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_model_rejected() {
        let client = client(StubProvider::default());

        let result = client.embed("hello", "no-such-model").await;
        assert!(matches!(result, Err(PlatformError::Config(_))));
    }

    #[tokio::test]
    async fn test_batch_preserves_order_across_cache_mix() {
        let provider = StubProvider::default();
        let batch_sizes = provider.batch_sizes.clone();
        let client = client(provider);

        // Warm the cache for the middle text only
        client.embed("beta", "text-embedding-ada-002").await.unwrap();

        let texts: Vec<String> = ["alpha", "beta", "gamma"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let vectors = client
            .embed_batch(&texts, "text-embedding-ada-002")
            .await
            .unwrap();

        assert_eq!(vectors.len(), 3);
        for (text, vector) in texts.iter().zip(&vectors) {
            assert_eq!(vector, &vector_for(text));
        }
        // Only the two misses went to the provider
        assert_eq!(*batch_sizes.lock(), vec![2]);
    }

    #[tokio::test]
    async fn test_batch_partitions_by_configured_size() {
        let provider = StubProvider::default();
        let batch_sizes = provider.batch_sizes.clone();

        let mut config = EmbeddingConfig::default();
        config.batch_size = 2;
        let client = EmbeddingClient::new(
            Box::new(provider),
            Arc::new(InMemoryCache::new()),
            config,
        );

        let texts: Vec<String> = (0..5).map(|i| format!("text-{i}")).collect();
        let vectors = client
            .embed_batch(&texts, "text-embedding-ada-002")
            .await
            .unwrap();

        assert_eq!(vectors.len(), 5);
        assert_eq!(*batch_sizes.lock(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_batch_count_mismatch_is_external_error() {
        let provider = StubProvider {
            short_batch: true,
            ..Default::default()
        };
        let client = client(provider);

        let texts: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let result = client.embed_batch(&texts, "text-embedding-ada-002").await;

        assert!(matches!(result, Err(PlatformError::ExternalCall { .. })));
    }

    #[tokio::test]
    async fn test_empty_batch_never_calls_provider() {
        let provider = StubProvider::default();
        let calls = provider.calls.clone();
        let client = client(provider);

        let vectors = client
            .embed_batch(&[], "text-embedding-ada-002")
            .await
            .unwrap();

        assert!(vectors.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cosine_identity_and_orthogonality() {
        let a = vec![1.0, 0.0];
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-6);

        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).unwrap().abs() < 1e-6);

        let c = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &c).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_norm_scores_zero() {
        let zero = vec![0.0, 0.0];
        let a = vec![1.0, 2.0];
        assert_eq!(cosine_similarity(&zero, &a).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        match cosine_similarity(&a, &b) {
            Err(PlatformError::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("expected DimensionMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_embedding_cost_rounds_to_micros() {
        let client = client(StubProvider::default());

        // 1234 tokens at $0.0001/1k
        let cost = client.embedding_cost("text-embedding-ada-002", 1234);
        assert_eq!(cost, 0.000123);

        assert_eq!(client.embedding_cost("no-such-model", 1000), 0.0);
    }

    #[test]
    fn test_cache_key_distinguishes_model_and_text() {
        let a = cache_key("model-a", "text");
        let b = cache_key("model-b", "text");
        let c = cache_key("model-a", "other");

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("embedding:model-a:"));
    }
}
