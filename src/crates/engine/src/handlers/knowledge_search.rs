//! `knowledge_search` node: similarity search against a knowledge base.

use super::{required_str, NodeContext, NodeHandler};
use async_trait::async_trait;
use knowledge::{KnowledgeService, SearchOptions};
use platform::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Queries the knowledge pipeline with config `knowledge_base_id` and a
/// resolved `query`; `top_k` and `threshold` override the base's search
/// settings. Output lists the hits, the distinct source document ids, and
/// the hit count.
pub struct KnowledgeSearchHandler {
    knowledge: Arc<KnowledgeService>,
}

impl KnowledgeSearchHandler {
    pub fn new(knowledge: Arc<KnowledgeService>) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl NodeHandler for KnowledgeSearchHandler {
    fn node_type(&self) -> &'static str {
        "knowledge_search"
    }

    async fn execute(&self, ctx: &NodeContext, config: &HashMap<String, Value>) -> Result<Value> {
        let knowledge_base_id = required_str(config, "knowledge_base_id")?;
        let query = required_str(config, "query")?;

        let opts = SearchOptions {
            top_k: config
                .get("top_k")
                .and_then(Value::as_u64)
                .map(|k| k as usize),
            similarity_threshold: config
                .get("threshold")
                .and_then(Value::as_f64)
                .map(|t| t as f32),
            rerank: None,
        };

        let results = self
            .knowledge
            .search(knowledge_base_id, &ctx.user_id, query, opts)
            .await?;

        let mut sources: Vec<String> = Vec::new();
        for hit in &results {
            if !sources.contains(&hit.document_id) {
                sources.push(hit.document_id.clone());
            }
        }
        let count = results.len();

        Ok(json!({
            "results": results,
            "sources": sources,
            "count": count,
        }))
    }
}
