//! End-to-end pipeline test: ingest a document, verify the persisted chunk
//! windows, and run a thresholded similarity search over the result.

use async_trait::async_trait;
use std::sync::Arc;

use knowledge::{
    CreateKnowledgeBase, EmbeddingProvider, FileStore, KnowledgeConfig, KnowledgeService,
    SearchOptions,
};
use platform::cache::InMemoryCache;
use platform::Result;
use storage::repositories::ChunkRepository;
use storage::{DatabaseConnection, DatabasePool};

/// Projects text onto three fixed axes so cosine scores are exact.
#[derive(Clone)]
struct KeywordProvider;

fn keyword_vector(text: &str) -> Vec<f32> {
    if text.contains("alpha") && text.contains("beta") {
        // A query mixing both keywords, weighted toward alpha
        vec![0.8, 0.6, 0.0]
    } else if text.contains("alpha") {
        vec![1.0, 0.0, 0.0]
    } else if text.contains("beta") {
        vec![0.0, 1.0, 0.0]
    } else {
        vec![0.0, 0.0, 1.0]
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    async fn embed(&self, text: &str, _model: &str) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }

    async fn embed_batch(&self, texts: &[String], _model: &str) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    fn clone_box(&self) -> Box<dyn EmbeddingProvider> {
        Box::new(self.clone())
    }
}

async fn service() -> (KnowledgeService, DatabasePool, tempfile::TempDir) {
    let conn = DatabaseConnection::in_memory().await.unwrap();
    conn.run_migrations().await.unwrap();
    let pool = conn.pool().clone();

    let dir = tempfile::tempdir().unwrap();
    let service = KnowledgeService::new(
        pool.clone(),
        Box::new(KeywordProvider),
        Arc::new(InMemoryCache::new()),
        FileStore::new(dir.path()),
        KnowledgeConfig::default(),
    );

    (service, pool, dir)
}

/// Pad to an exact byte length with filler that matches no keyword axis.
fn padded(seed: &str, len: usize) -> String {
    let mut text = seed.to_string();
    while text.len() < len {
        text.push_str(" lorem");
    }
    text.truncate(len);
    text
}

#[tokio::test]
async fn test_ingest_produces_expected_chunk_windows() {
    let (service, pool, _dir) = service().await;

    let kb = service
        .create_knowledge_base(
            "user-1",
            CreateKnowledgeBase {
                name: "Handbook".to_string(),
                chunk_size: Some(1000),
                chunk_overlap: Some(200),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // 2500 ASCII characters; three windows sharing 200 characters each
    let content = padded("alpha", 2500);
    assert_eq!(content.len(), 2500);

    let document = service
        .ingest(&kb.id, "user-1", "handbook.txt", content.as_bytes())
        .await
        .unwrap();

    assert!(document.is_completed());
    assert_eq!(document.chunk_count, 3);

    let chunks = ChunkRepository::list_for_document(&pool, &document.id)
        .await
        .unwrap();
    let spans: Vec<(i64, i64)> = chunks
        .iter()
        .map(|c| (c.start_position, c.end_position))
        .collect();
    assert_eq!(spans, vec![(0, 1000), (800, 1800), (1600, 2500)]);

    // Every chunk carries its vector id and the flat-rate embedding cost
    for chunk in &chunks {
        assert!(chunk.vector_id.is_some());
        assert!(chunk.embedding_cost > 0.0);
    }

    // token estimate is ceil(chars / 4) per chunk
    assert_eq!(chunks[0].token_count, 250);
    assert_eq!(chunks[2].token_count, 225);
    assert_eq!(document.token_count, 725);
}

#[tokio::test]
async fn test_search_is_thresholded_and_descending() {
    let (service, _pool, _dir) = service().await;

    let kb = service
        .create_knowledge_base(
            "user-1",
            CreateKnowledgeBase {
                name: "Handbook".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    service
        .ingest(&kb.id, "user-1", "alpha.txt", b"alpha deployment guide")
        .await
        .unwrap();
    service
        .ingest(&kb.id, "user-1", "beta.txt", b"beta changelog")
        .await
        .unwrap();
    service
        .ingest(&kb.id, "user-1", "gamma.txt", b"unrelated gamma appendix")
        .await
        .unwrap();

    // Query scores 0.8 against alpha, 0.6 against beta, 0.0 against gamma
    let results = service
        .search(
            &kb.id,
            "user-1",
            "alpha beta",
            SearchOptions {
                similarity_threshold: Some(0.5),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.len() <= 5);
    assert!(results[0].score >= results[1].score);
    assert!(results[0].content.contains("alpha"));
    assert!(results[1].content.contains("beta"));
    for result in &results {
        assert!(result.score >= 0.5);
    }

    // The default 0.7 threshold drops the beta hit as well
    let strict = service
        .search(&kb.id, "user-1", "alpha beta", SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(strict.len(), 1);
    assert!(strict[0].content.contains("alpha"));
}

#[tokio::test]
async fn test_public_knowledge_base_is_searchable_by_others() {
    let (service, _pool, _dir) = service().await;

    let kb = service
        .create_knowledge_base(
            "owner",
            CreateKnowledgeBase {
                name: "Shared".to_string(),
                is_public: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    service
        .ingest(&kb.id, "owner", "alpha.txt", b"alpha shared notes")
        .await
        .unwrap();

    let results = service
        .search(&kb.id, "reader", "alpha", SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);

    // Reading is shared; writing stays with the owner
    let err = service
        .ingest(&kb.id, "reader", "sneak.txt", b"alpha sneak")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
