//! Knowledge pipeline: knowledge-base lifecycle, document ingestion,
//! processing, retrieval, and statistics.
//!
//! The service owns no algorithm of its own; it sequences the chunker, the
//! embedding client, the parser registry, the vector backend, and the file
//! store over the repository layer. Every failure path lands on the document
//! row, so no document is ever left in `processing`.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use platform::cache::CacheStore;
use platform::{PlatformError, Result};
use storage::models::{KnowledgeBase, KnowledgeChunk, KnowledgeDocument};
use storage::repositories::{ChunkRepository, DocumentRepository, KnowledgeBaseRepository};
use storage::DatabasePool;

use crate::chunker;
use crate::config::{KnowledgeConfig, SearchOptions, SearchSettings};
use crate::embedding::{EmbeddingClient, EmbeddingProvider};
use crate::files::FileStore;
use crate::parser::ParserRegistry;
use crate::vector::{BackendRegistry, SearchHit};

/// Parameters for creating a knowledge base.
///
/// Unset fields fall back to [`KnowledgeConfig`] defaults.
#[derive(Debug, Clone, Default)]
pub struct CreateKnowledgeBase {
    pub name: String,
    pub description: Option<String>,
    pub vector_backend: Option<String>,
    pub embedding_model: Option<String>,
    pub chunk_size: Option<i64>,
    pub chunk_overlap: Option<i64>,
    pub settings: Option<SearchSettings>,
    pub is_public: bool,
}

/// Parameters for updating a knowledge base.
///
/// Unset fields keep their stored values. Geometry changes pass the same
/// validation as creation and take effect for documents processed afterwards;
/// existing chunks keep the geometry they were cut with until reprocessed.
#[derive(Debug, Clone, Default)]
pub struct UpdateKnowledgeBase {
    pub name: Option<String>,
    pub description: Option<String>,
    pub chunk_size: Option<i64>,
    pub chunk_overlap: Option<i64>,
    pub settings: Option<SearchSettings>,
}

/// One retrieval hit mapped back to its chunk and document
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SearchResult {
    pub content: String,
    pub score: f32,
    pub chunk_id: String,
    pub document_id: String,
}

impl SearchResult {
    fn from_hit(hit: SearchHit) -> Self {
        let text = |key: &str| {
            hit.metadata
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            content: text("content"),
            score: hit.score,
            chunk_id: text("chunk_id"),
            document_id: text("document_id"),
        }
    }
}

/// Post-retrieval reordering hook.
///
/// The default pipeline ships without one; search results keep the backend's
/// score order. Installing a reranker changes ordering only, never membership.
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Vec<SearchResult>;
}

/// Aggregate figures for one knowledge base
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct KnowledgeBaseStatistics {
    pub total_documents: i64,
    pub completed_documents: i64,
    pub pending_documents: i64,
    pub processing_documents: i64,
    pub failed_documents: i64,
    pub total_chunks: i64,
    pub total_tokens: i64,
    pub total_file_size: i64,
    pub total_embedding_cost: f64,
    pub documents_by_file_type: Vec<(String, i64)>,
}

/// Document ingestion and retrieval over one database pool.
pub struct KnowledgeService {
    pool: DatabasePool,
    embeddings: EmbeddingClient,
    backends: BackendRegistry,
    parsers: ParserRegistry,
    files: FileStore,
    reranker: Option<Arc<dyn Reranker>>,
    config: KnowledgeConfig,
}

impl KnowledgeService {
    /// Build a service with the default backend and parser registries.
    ///
    /// The embedding cache is shared with the caller so the rate limiter and
    /// other cache users can live on the same store.
    pub fn new(
        pool: DatabasePool,
        provider: Box<dyn EmbeddingProvider>,
        cache: Arc<dyn CacheStore>,
        files: FileStore,
        config: KnowledgeConfig,
    ) -> Self {
        let embeddings = EmbeddingClient::new(provider, cache, config.embedding.clone());
        Self {
            pool,
            embeddings,
            backends: BackendRegistry::with_defaults(),
            parsers: ParserRegistry::with_defaults(),
            files,
            reranker: None,
            config,
        }
    }

    /// Replace the backend registry
    pub fn with_backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = backends;
        self
    }

    /// Replace the parser registry
    pub fn with_parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = parsers;
        self
    }

    /// Install a post-retrieval reranker
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Create a knowledge base and prepare its vector index.
    ///
    /// Validation collects every violation before reporting: empty name,
    /// unregistered backend, unknown embedding model, and chunk geometry out
    /// of bounds are all listed in one `Validation` error.
    pub async fn create_knowledge_base(
        &self,
        user_id: &str,
        spec: CreateKnowledgeBase,
    ) -> Result<KnowledgeBase> {
        let mut errors = Vec::new();

        if spec.name.trim().is_empty() {
            errors.push("name must not be empty".to_string());
        }

        let vector_backend = spec
            .vector_backend
            .unwrap_or_else(|| self.config.default_vector_backend.clone());
        if !self.backends.contains(&vector_backend) {
            errors.push(format!(
                "vector backend '{vector_backend}' is not registered"
            ));
        }

        let embedding_model = spec
            .embedding_model
            .unwrap_or_else(|| self.config.embedding.default_model.clone());
        if self.config.model_info(&embedding_model).is_none() {
            errors.push(format!(
                "embedding model '{embedding_model}' is not in the catalog"
            ));
        }

        let chunk_size = spec
            .chunk_size
            .unwrap_or(self.config.processing.chunk_size as i64);
        let chunk_overlap = spec
            .chunk_overlap
            .unwrap_or(self.config.processing.chunk_overlap as i64);
        errors.extend(self.config.validate_chunk_geometry(chunk_size, chunk_overlap));

        if !errors.is_empty() {
            return Err(PlatformError::Validation { errors });
        }

        let mut kb = KnowledgeBase::new(
            Uuid::new_v4().to_string(),
            user_id.to_string(),
            spec.name.trim().to_string(),
        )
        .with_backend(&vector_backend)
        .with_embedding_model(&embedding_model)
        .with_chunking(chunk_size, chunk_overlap);

        if let Some(description) = spec.description {
            kb = kb.with_description(description);
        }
        if let Some(settings) = &spec.settings {
            kb = kb.with_settings(serde_json::to_string(settings)?);
        }
        if spec.is_public {
            kb = kb.public();
        }

        let kb = KnowledgeBaseRepository::create(&self.pool, kb).await?;
        self.backends.get(&kb.vector_backend)?.create_index(&kb).await?;

        info!(
            knowledge_base_id = %kb.id,
            user_id,
            backend = %kb.vector_backend,
            model = %kb.embedding_model,
            "Knowledge base created"
        );

        Ok(kb)
    }

    /// Update an owned knowledge base's details, geometry, or settings.
    ///
    /// The merged geometry (updates over stored values) is validated with the
    /// creation rules, so an update can never leave `chunk_overlap >=
    /// chunk_size` behind.
    pub async fn update_knowledge_base(
        &self,
        knowledge_base_id: &str,
        user_id: &str,
        update: UpdateKnowledgeBase,
    ) -> Result<KnowledgeBase> {
        let kb = KnowledgeBaseRepository::get_owned(&self.pool, knowledge_base_id, user_id)
            .await?
            .ok_or_else(|| {
                PlatformError::NotFound(format!("knowledge base {knowledge_base_id}"))
            })?;

        let mut errors = Vec::new();

        let name = update
            .name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&kb.name)
            .to_string();
        if name.is_empty() {
            errors.push("name must not be empty".to_string());
        }

        let chunk_size = update.chunk_size.unwrap_or(kb.chunk_size);
        let chunk_overlap = update.chunk_overlap.unwrap_or(kb.chunk_overlap);
        errors.extend(self.config.validate_chunk_geometry(chunk_size, chunk_overlap));

        if !errors.is_empty() {
            return Err(PlatformError::Validation { errors });
        }

        if update.name.is_some() || update.description.is_some() {
            let description = update.description.as_deref().or(kb.description.as_deref());
            KnowledgeBaseRepository::update_details(&self.pool, &kb.id, &name, description)
                .await?;
        }
        if update.chunk_size.is_some() || update.chunk_overlap.is_some() {
            KnowledgeBaseRepository::update_chunking(&self.pool, &kb.id, chunk_size, chunk_overlap)
                .await?;
        }
        if let Some(settings) = &update.settings {
            KnowledgeBaseRepository::update_settings(
                &self.pool,
                &kb.id,
                &serde_json::to_string(settings)?,
            )
            .await?;
        }

        let kb = KnowledgeBaseRepository::get_by_id(&self.pool, &kb.id)
            .await?
            .ok_or_else(|| {
                PlatformError::NotFound(format!("knowledge base {knowledge_base_id}"))
            })?;

        info!(knowledge_base_id = %kb.id, user_id, "Knowledge base updated");
        Ok(kb)
    }

    /// Ingest a file into a knowledge base and process it synchronously.
    ///
    /// The raw bytes are hashed before anything is stored; a document with
    /// the same hash in the same knowledge base is rejected as a duplicate.
    /// The returned document is `completed`; a processing failure leaves the
    /// row `failed` and propagates the error so the caller can `reprocess`.
    pub async fn ingest(
        &self,
        knowledge_base_id: &str,
        user_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<KnowledgeDocument> {
        let kb = KnowledgeBaseRepository::get_owned(&self.pool, knowledge_base_id, user_id)
            .await?
            .ok_or_else(|| {
                PlatformError::NotFound(format!("knowledge base {knowledge_base_id}"))
            })?;

        if bytes.len() > self.config.processing.max_file_size {
            return Err(PlatformError::validation(format!(
                "file exceeds the maximum size of {} bytes",
                self.config.processing.max_file_size
            )));
        }

        let file_type = file_extension(filename)
            .ok_or_else(|| PlatformError::UnsupportedFormat(filename.to_string()))?;
        if !self.config.supports_format(&file_type) || !self.parsers.supports(&file_type) {
            return Err(PlatformError::UnsupportedFormat(file_type));
        }

        let content_hash = format!("{:x}", Sha256::digest(bytes));
        if let Some(existing) =
            DocumentRepository::find_by_hash(&self.pool, &kb.id, &content_hash).await?
        {
            debug!(
                knowledge_base_id = %kb.id,
                document_id = %existing.id,
                "Duplicate upload rejected"
            );
            return Err(PlatformError::DuplicateDocument {
                knowledge_base_id: kb.id,
                hash: content_hash,
            });
        }

        let document_id = Uuid::new_v4().to_string();
        let stored_name = format!("{document_id}.{file_type}");
        let file_path = self.files.put(&kb.id, &stored_name, bytes).await?;

        let document = DocumentRepository::create(
            &self.pool,
            KnowledgeDocument::new(
                document_id,
                kb.id.clone(),
                filename.to_string(),
                file_type,
                bytes.len() as i64,
                file_path,
                content_hash,
            ),
        )
        .await?;
        KnowledgeBaseRepository::recalculate_counters(&self.pool, &kb.id).await?;

        info!(
            document_id = %document.id,
            knowledge_base_id = %kb.id,
            filename,
            size = document.file_size,
            "Document ingested"
        );

        self.process(&document.id).await
    }

    /// Run a pending or failed document through parse, chunk, embed, store.
    ///
    /// Claims the row with a conditional `processing` transition so two
    /// processors cannot both work on it. Any error after the claim marks the
    /// document `failed` with the message and still refreshes the knowledge
    /// base counters.
    pub async fn process(&self, document_id: &str) -> Result<KnowledgeDocument> {
        let document = DocumentRepository::get_by_id(&self.pool, document_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("document {document_id}")))?;
        let kb = KnowledgeBaseRepository::get_by_id(&self.pool, &document.knowledge_base_id)
            .await?
            .ok_or_else(|| {
                PlatformError::NotFound(format!(
                    "knowledge base {}",
                    document.knowledge_base_id
                ))
            })?;

        if !DocumentRepository::mark_processing(&self.pool, document_id).await? {
            return Err(PlatformError::InvalidStateTransition {
                from: document.status,
                to: "processing".to_string(),
            });
        }

        match self.run_pipeline(&kb, &document).await {
            Ok(processed) => {
                KnowledgeBaseRepository::recalculate_counters(&self.pool, &kb.id).await?;
                info!(
                    document_id,
                    knowledge_base_id = %kb.id,
                    chunks = processed.chunk_count,
                    tokens = processed.token_count,
                    "Document processed"
                );
                Ok(processed)
            }
            Err(e) => {
                DocumentRepository::mark_failed(&self.pool, document_id, &e.to_string()).await?;
                KnowledgeBaseRepository::recalculate_counters(&self.pool, &kb.id).await?;
                error!(document_id, error = %e, "Document processing failed");
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        kb: &KnowledgeBase,
        document: &KnowledgeDocument,
    ) -> Result<KnowledgeDocument> {
        let bytes = self.files.read(&document.file_path).await?;
        let parser = self.parsers.get(&document.file_type)?;
        let content = parser.parse(&bytes)?;

        let chunks = chunker::chunk_text(
            &content,
            kb.chunk_size as usize,
            kb.chunk_overlap as usize,
        )?;
        let backend = self.backends.get(&kb.vector_backend)?;

        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let row = ChunkRepository::create(
                &self.pool,
                KnowledgeChunk::new(
                    Uuid::new_v4().to_string(),
                    document.id.clone(),
                    kb.id.clone(),
                    chunk.index as i64,
                    chunk.content.clone(),
                    chunk.start as i64,
                    chunk.end as i64,
                    chunk.token_estimate as i64,
                ),
            )
            .await?;
            rows.push(row);
        }

        let texts: Vec<String> = rows.iter().map(|row| row.content.clone()).collect();
        let vectors = self.embeddings.embed_batch(&texts, &kb.embedding_model).await?;

        for (row, vector) in rows.iter().zip(vectors) {
            let metadata = json!({
                "chunk_id": row.id,
                "document_id": document.id,
                "content": row.content,
            });
            let vector_id = backend.store(kb, vector, metadata).await?;
            let cost = self
                .embeddings
                .embedding_cost(&kb.embedding_model, row.token_count as usize);
            ChunkRepository::set_vector(&self.pool, &row.id, &vector_id, cost).await?;
        }

        let chunk_count = rows.len() as i64;
        let token_count: i64 = rows.iter().map(|row| row.token_count).sum();

        if !DocumentRepository::mark_completed(
            &self.pool,
            &document.id,
            &content,
            chunk_count,
            token_count,
        )
        .await?
        {
            let current = DocumentRepository::get_by_id(&self.pool, &document.id)
                .await?
                .map(|d| d.status)
                .unwrap_or_else(|| "missing".to_string());
            return Err(PlatformError::InvalidStateTransition {
                from: current,
                to: "completed".to_string(),
            });
        }

        DocumentRepository::get_by_id(&self.pool, &document.id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("document {}", document.id)))
    }

    /// Similarity search over a readable knowledge base.
    ///
    /// Effective settings are the call options merged over the knowledge
    /// base's stored settings over the configured defaults; `top_k` is capped
    /// at the configured maximum regardless of overrides.
    pub async fn search(
        &self,
        knowledge_base_id: &str,
        user_id: &str,
        query: &str,
        opts: SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(PlatformError::validation("query must not be empty"));
        }

        let kb = KnowledgeBaseRepository::get_readable(&self.pool, knowledge_base_id, user_id)
            .await?
            .ok_or_else(|| {
                PlatformError::NotFound(format!("knowledge base {knowledge_base_id}"))
            })?;

        let settings = SearchSettings::parse(&kb.settings);
        let top_k = opts
            .top_k
            .or(settings.max_results)
            .unwrap_or(self.config.retrieval.default_top_k)
            .min(self.config.retrieval.max_top_k);
        let threshold = opts
            .similarity_threshold
            .or(settings.similarity_threshold)
            .unwrap_or(self.config.retrieval.similarity_threshold);
        let rerank = opts
            .rerank
            .or(settings.rerank_enabled)
            .unwrap_or(self.config.retrieval.rerank_enabled);

        let query_vector = self.embeddings.embed(query, &kb.embedding_model).await?;
        let backend = self.backends.get(&kb.vector_backend)?;
        let hits = backend.search(&kb, &query_vector, top_k, threshold).await?;

        let mut results: Vec<SearchResult> =
            hits.into_iter().map(SearchResult::from_hit).collect();

        if rerank {
            if let Some(reranker) = &self.reranker {
                results = reranker.rerank(query, results);
            }
        }

        debug!(
            knowledge_base_id,
            hits = results.len(),
            top_k,
            threshold,
            "Knowledge search served"
        );

        Ok(results)
    }

    /// Delete a document with its chunks, vectors, and stored file.
    ///
    /// Backend vectors go first so a backend failure surfaces before any
    /// local state is lost; the file store delete is idempotent.
    pub async fn delete_document(&self, document_id: &str, user_id: &str) -> Result<()> {
        let document = DocumentRepository::get_by_id(&self.pool, document_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("document {document_id}")))?;
        let kb =
            KnowledgeBaseRepository::get_owned(&self.pool, &document.knowledge_base_id, user_id)
                .await?
                .ok_or_else(|| {
                    PlatformError::NotFound(format!(
                        "knowledge base {}",
                        document.knowledge_base_id
                    ))
                })?;

        let backend = self.backends.get(&kb.vector_backend)?;
        for chunk in ChunkRepository::list_for_document(&self.pool, &document.id).await? {
            if let Some(vector_id) = &chunk.vector_id {
                backend.delete(&kb, vector_id).await?;
            }
        }

        ChunkRepository::delete_for_document(&self.pool, &document.id).await?;
        self.files.delete(&document.file_path).await?;
        DocumentRepository::delete(&self.pool, &document.id).await?;
        KnowledgeBaseRepository::recalculate_counters(&self.pool, &kb.id).await?;

        info!(document_id, knowledge_base_id = %kb.id, "Document deleted");
        Ok(())
    }

    /// Re-run a failed document through processing.
    ///
    /// Chunks and vectors left behind by the failed attempt are removed
    /// before the new run so nothing is double-indexed.
    pub async fn reprocess(&self, document_id: &str, user_id: &str) -> Result<KnowledgeDocument> {
        let document = DocumentRepository::get_by_id(&self.pool, document_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("document {document_id}")))?;
        let kb =
            KnowledgeBaseRepository::get_owned(&self.pool, &document.knowledge_base_id, user_id)
                .await?
                .ok_or_else(|| {
                    PlatformError::NotFound(format!(
                        "knowledge base {}",
                        document.knowledge_base_id
                    ))
                })?;

        if !document.is_failed() {
            return Err(PlatformError::InvalidStateTransition {
                from: document.status,
                to: "processing".to_string(),
            });
        }

        let backend = self.backends.get(&kb.vector_backend)?;
        for chunk in ChunkRepository::list_for_document(&self.pool, &document.id).await? {
            if let Some(vector_id) = &chunk.vector_id {
                backend.delete(&kb, vector_id).await?;
            }
        }
        ChunkRepository::delete_for_document(&self.pool, &document.id).await?;

        info!(document_id, knowledge_base_id = %kb.id, "Document reprocess requested");
        self.process(document_id).await
    }

    /// Aggregate figures for a readable knowledge base
    pub async fn statistics(
        &self,
        knowledge_base_id: &str,
        user_id: &str,
    ) -> Result<KnowledgeBaseStatistics> {
        let kb = KnowledgeBaseRepository::get_readable(&self.pool, knowledge_base_id, user_id)
            .await?
            .ok_or_else(|| {
                PlatformError::NotFound(format!("knowledge base {knowledge_base_id}"))
            })?;

        let by_status = DocumentRepository::count_by_status(&self.pool, &kb.id).await?;
        let count_for = |status: &str| {
            by_status
                .iter()
                .find(|(s, _)| s == status)
                .map(|(_, n)| *n)
                .unwrap_or(0)
        };

        Ok(KnowledgeBaseStatistics {
            total_documents: by_status.iter().map(|(_, n)| n).sum(),
            completed_documents: count_for("completed"),
            pending_documents: count_for("pending"),
            processing_documents: count_for("processing"),
            failed_documents: count_for("failed"),
            total_chunks: ChunkRepository::count_for_knowledge_base(&self.pool, &kb.id).await?,
            total_tokens: kb.total_tokens,
            total_file_size: DocumentRepository::total_file_size(&self.pool, &kb.id).await?,
            total_embedding_cost: ChunkRepository::total_embedding_cost(&self.pool, &kb.id)
                .await?,
            documents_by_file_type: DocumentRepository::count_by_file_type(&self.pool, &kb.id)
                .await?,
        })
    }
}

fn file_extension(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}
