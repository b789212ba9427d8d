//! Typed user memory with TTL expiry, relevance retrieval, and consolidation.
//!
//! Memories live in one of four classes with different lifetimes and default
//! weights. Each row occupies the slot `(user, type, key, context)`; storing
//! into an occupied slot overwrites it and resets the access counter. Reads
//! never return expired rows even before a cleanup pass has deleted them.

use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use platform::{PlatformError, Result};
use storage::models::Memory;
use storage::repositories::{MemoryRepository, MemoryTypeStats};
use storage::DatabasePool;

use crate::scoring;

/// Candidate pool sizes per source for relevance retrieval
const META_POOL: i64 = 5;
const LONG_TERM_POOL: i64 = 10;
const CONTEXT_POOL: i64 = 10;
const WORKING_POOL: i64 = 5;

/// Importance floor for a short-term row to qualify for consolidation
const CONSOLIDATION_IMPORTANCE: i64 = 7;

/// Access-count floor for a short-term row to qualify for consolidation
const CONSOLIDATION_ACCESS_COUNT: i64 = 2;

/// The four memory classes, from most volatile to most durable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryType {
    ShortTerm,
    Working,
    LongTerm,
    Meta,
}

impl MemoryType {
    pub const ALL: [MemoryType; 4] = [
        MemoryType::ShortTerm,
        MemoryType::Working,
        MemoryType::LongTerm,
        MemoryType::Meta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::ShortTerm => "short_term",
            MemoryType::Working => "working",
            MemoryType::LongTerm => "long_term",
            MemoryType::Meta => "meta",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "short_term" => Ok(MemoryType::ShortTerm),
            "working" => Ok(MemoryType::Working),
            "long_term" => Ok(MemoryType::LongTerm),
            "meta" => Ok(MemoryType::Meta),
            other => Err(PlatformError::validation(format!(
                "unknown memory type: {other}"
            ))),
        }
    }

    /// Default lifetime in seconds; `None` never expires
    pub fn ttl_secs(&self) -> Option<i64> {
        match self {
            MemoryType::ShortTerm => Some(3_600),
            MemoryType::Working => Some(86_400),
            MemoryType::LongTerm => Some(2_592_000),
            MemoryType::Meta => None,
        }
    }

    fn base_importance(&self) -> i64 {
        match self {
            MemoryType::ShortTerm => 1,
            MemoryType::Working => 3,
            MemoryType::LongTerm => 5,
            MemoryType::Meta => 10,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional knobs for [`MemoryService::store`]
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Scope key; memories in different contexts occupy different slots
    pub context: Option<String>,
    /// Free-form JSON attached to the row
    pub metadata: Option<Value>,
    /// Overrides the type-derived importance score
    pub importance: Option<i64>,
    /// Overrides the type-default TTL
    pub ttl_secs: Option<i64>,
}

impl StoreOptions {
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_importance(mut self, importance: i64) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }
}

/// One ranked hit from [`MemoryService::retrieve_relevant`]
#[derive(Debug, Clone, serde::Serialize)]
pub struct RetrievedMemory {
    pub memory_type: String,
    pub key: String,
    pub value: Value,
    pub importance: i64,
    pub relevance: f64,
}

/// Per-user memory statistics
#[derive(Debug, Clone)]
pub struct MemoryStatistics {
    pub total_memories: i64,
    pub expired_memories: i64,
    pub active_memories: i64,
    pub by_type: Vec<MemoryTypeStats>,
}

/// Memory store over the shared database pool
#[derive(Clone)]
pub struct MemoryService {
    pool: DatabasePool,
}

impl MemoryService {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Insert or overwrite the memory at `(user, type, key, context)`.
    ///
    /// Importance defaults to the type's base score plus a bonus for long
    /// values; expiry defaults to the type's TTL. Overwrites reset the
    /// access counter, so re-storing the same fact starts its life over.
    pub async fn store(
        &self,
        user_id: &str,
        memory_type: MemoryType,
        key: &str,
        value: &str,
        options: StoreOptions,
    ) -> Result<Memory> {
        let importance = options
            .importance
            .unwrap_or_else(|| default_importance(memory_type, value));

        let mut memory = Memory::new(
            Uuid::new_v4().to_string(),
            user_id.to_string(),
            memory_type.as_str().to_string(),
            key.to_string(),
            value.to_string(),
        )
        .with_importance(importance);

        if let Some(context) = &options.context {
            memory = memory.with_context(context.clone());
        }
        if let Some(metadata) = &options.metadata {
            memory = memory.with_metadata(metadata.to_string());
        }
        if let Some(expires_at) = expiry_for(memory_type, options.ttl_secs) {
            memory = memory.with_expiry(expires_at);
        }

        let stored = MemoryRepository::upsert(&self.pool, memory).await?;
        debug!(
            user_id,
            memory_type = %memory_type,
            key,
            importance = stored.importance_score,
            "memory stored"
        );

        Ok(stored)
    }

    /// Exact lookup, skipping expired rows; bumps access stats on a hit
    pub async fn retrieve(
        &self,
        user_id: &str,
        memory_type: MemoryType,
        key: &str,
        context: Option<&str>,
    ) -> Result<Option<Memory>> {
        let now = Utc::now().to_rfc3339();
        match MemoryRepository::find(
            &self.pool,
            user_id,
            memory_type.as_str(),
            key,
            context.unwrap_or(""),
            &now,
        )
        .await?
        {
            Some(mut memory) => {
                MemoryRepository::touch_access(&self.pool, &memory.id, &now).await?;
                memory.access_count += 1;
                memory.last_accessed_at = now;
                Ok(Some(memory))
            }
            None => Ok(None),
        }
    }

    /// Rank stored memories against a free-text query.
    ///
    /// Candidates come from fixed-size pools: meta, long-term, the given
    /// context (when any), and working. A candidate qualifies when any query
    /// word of four or more characters appears in its key or value;
    /// qualifying rows are ranked by blended word overlap and importance.
    /// Purely lexical, see [`scoring`] for the limitation.
    pub async fn retrieve_relevant(
        &self,
        user_id: &str,
        query: &str,
        context: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RetrievedMemory>> {
        let now = Utc::now().to_rfc3339();

        let mut candidates = MemoryRepository::list_by_type(
            &self.pool,
            user_id,
            MemoryType::Meta.as_str(),
            &now,
            META_POOL,
        )
        .await?;
        candidates.extend(
            MemoryRepository::list_by_type(
                &self.pool,
                user_id,
                MemoryType::LongTerm.as_str(),
                &now,
                LONG_TERM_POOL,
            )
            .await?,
        );
        if let Some(context) = context {
            candidates.extend(
                MemoryRepository::list_for_context(&self.pool, user_id, context, &now, CONTEXT_POOL)
                    .await?,
            );
        }
        candidates.extend(
            MemoryRepository::list_by_type(
                &self.pool,
                user_id,
                MemoryType::Working.as_str(),
                &now,
                WORKING_POOL,
            )
            .await?,
        );

        let mut hits: Vec<RetrievedMemory> = candidates
            .iter()
            .filter_map(|memory| {
                let text = format!("{} {}", memory.key, memory.value);
                if !scoring::is_relevant(query, &text) {
                    return None;
                }
                Some(RetrievedMemory {
                    memory_type: memory.memory_type.clone(),
                    key: memory.key.clone(),
                    value: memory.decoded_value(),
                    importance: memory.importance_score,
                    relevance: scoring::relevance(query, &text),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            scoring::rank(b.relevance, b.importance).total_cmp(&scoring::rank(a.relevance, a.importance))
        });
        hits.truncate(limit);

        debug!(user_id, query, hits = hits.len(), "relevant memories retrieved");
        Ok(hits)
    }

    /// Delete every row past its expiry, returning the count removed
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let removed = MemoryRepository::delete_expired(&self.pool, &Utc::now().to_rfc3339()).await?;
        info!(removed, "expired memories cleaned up");
        Ok(removed)
    }

    /// Trim a user to their `keep` most important memories
    pub async fn cleanup_by_importance(&self, user_id: &str, keep: i64) -> Result<u64> {
        let removed =
            MemoryRepository::delete_excess_by_importance(&self.pool, user_id, keep).await?;
        info!(user_id, removed, "memories trimmed by importance");
        Ok(removed)
    }

    /// Promote short-term memories that proved useful into long-term.
    ///
    /// A short-term row qualifies once its importance reaches 7 and it has
    /// been read at least once after storing. The promoted copy keeps the
    /// key, context, value, metadata, and importance, takes the long-term
    /// TTL, and the source row is deleted. Returns the promoted count.
    pub async fn consolidate(&self, user_id: &str) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let candidates = MemoryRepository::consolidation_candidates(
            &self.pool,
            user_id,
            CONSOLIDATION_IMPORTANCE,
            CONSOLIDATION_ACCESS_COUNT,
            &now,
        )
        .await?;

        let mut promoted = 0;
        for memory in candidates {
            let mut copy = Memory::new(
                Uuid::new_v4().to_string(),
                user_id.to_string(),
                MemoryType::LongTerm.as_str().to_string(),
                memory.key.clone(),
                memory.value.clone(),
            )
            .with_context(memory.context.clone())
            .with_importance(memory.importance_score);

            if let Some(metadata) = &memory.metadata {
                copy = copy.with_metadata(metadata.clone());
            }
            if let Some(expires_at) = expiry_for(MemoryType::LongTerm, None) {
                copy = copy.with_expiry(expires_at);
            }

            MemoryRepository::upsert(&self.pool, copy).await?;
            MemoryRepository::delete(&self.pool, &memory.id).await?;
            promoted += 1;
        }

        info!(user_id, promoted, "short-term memories consolidated");
        Ok(promoted)
    }

    /// Non-expired memories at or above `threshold`, most important first
    pub async fn important(&self, user_id: &str, threshold: i64) -> Result<Vec<Memory>> {
        let now = Utc::now().to_rfc3339();
        Ok(MemoryRepository::list_important(&self.pool, user_id, threshold, &now).await?)
    }

    /// Per-type counts and overall totals for one user
    pub async fn statistics(&self, user_id: &str) -> Result<MemoryStatistics> {
        let now = Utc::now().to_rfc3339();
        let by_type = MemoryRepository::stats_by_type(&self.pool, user_id).await?;
        let expired = MemoryRepository::count_expired(&self.pool, user_id, &now).await?;
        let total: i64 = by_type.iter().map(|row| row.count).sum();

        Ok(MemoryStatistics {
            total_memories: total,
            expired_memories: expired,
            active_memories: total - expired,
            by_type,
        })
    }
}

/// Type base score plus a bonus for long values
fn default_importance(memory_type: MemoryType, value: &str) -> i64 {
    let mut score = memory_type.base_importance();
    if value.len() > 1000 {
        score += 2;
    } else if value.len() > 500 {
        score += 1;
    }
    score
}

/// Absolute expiry timestamp for a type, honoring an explicit TTL override
fn expiry_for(memory_type: MemoryType, ttl_override: Option<i64>) -> Option<String> {
    ttl_override
        .or_else(|| memory_type.ttl_secs())
        .map(|ttl| (Utc::now() + Duration::seconds(ttl)).to_rfc3339())
}
