//! `memory_store` / `memory_retrieve` nodes.
//!
//! Both are scoped to a `workflow_{workflow_id}` context so runs of
//! different workflows never see each other's working state.

use super::{required_str, NodeContext, NodeHandler};
use async_trait::async_trait;
use memory::{MemoryService, MemoryType, StoreOptions};
use platform::{PlatformError, Result};
use serde_json::{json, Value};
use std::collections::HashMap;

fn memory_type(config: &HashMap<String, Value>) -> Result<MemoryType> {
    match config.get("memory_type").and_then(Value::as_str) {
        Some(name) => MemoryType::parse(name),
        None => Ok(MemoryType::Working),
    }
}

fn workflow_context(ctx: &NodeContext) -> String {
    format!("workflow_{}", ctx.workflow_id)
}

/// Writes config `key`/`value` into the memory store; `memory_type`
/// defaults to `working`.
pub struct MemoryStoreHandler {
    memory: MemoryService,
}

impl MemoryStoreHandler {
    pub fn new(memory: MemoryService) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl NodeHandler for MemoryStoreHandler {
    fn node_type(&self) -> &'static str {
        "memory_store"
    }

    async fn execute(&self, ctx: &NodeContext, config: &HashMap<String, Value>) -> Result<Value> {
        let key = required_str(config, "key")?;
        let value = match config.get("value") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => return Err(PlatformError::validation("node config is missing 'value'")),
        };

        let stored = self
            .memory
            .store(
                &ctx.user_id,
                memory_type(config)?,
                key,
                &value,
                StoreOptions::default().with_context(workflow_context(ctx)),
            )
            .await?;

        Ok(json!({ "success": true, "memory_id": stored.id }))
    }
}

/// Reads config `key` back out of the store; output reports the decoded
/// value (null when absent) and whether the key was found.
pub struct MemoryRetrieveHandler {
    memory: MemoryService,
}

impl MemoryRetrieveHandler {
    pub fn new(memory: MemoryService) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl NodeHandler for MemoryRetrieveHandler {
    fn node_type(&self) -> &'static str {
        "memory_retrieve"
    }

    async fn execute(&self, ctx: &NodeContext, config: &HashMap<String, Value>) -> Result<Value> {
        let key = required_str(config, "key")?;

        let found = self
            .memory
            .retrieve(
                &ctx.user_id,
                memory_type(config)?,
                key,
                Some(&workflow_context(ctx)),
            )
            .await?;

        Ok(match found {
            Some(memory) => json!({ "value": memory.decoded_value(), "found": true }),
            None => json!({ "value": Value::Null, "found": false }),
        })
    }
}
