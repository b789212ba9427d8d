//! Node handler dispatch.
//!
//! Each node type is one [`NodeHandler`] implementation looked up in a
//! [`HandlerRegistry`] by type name. Adding a node type means registering
//! a new handler; the engine itself never switches on type strings.

mod ai_call;
mod condition;
mod data_transform;
mod knowledge_search;
mod memory;

pub use ai_call::AiCallHandler;
pub use condition::ConditionHandler;
pub use data_transform::DataTransformHandler;
pub use knowledge_search::KnowledgeSearchHandler;
pub use memory::{MemoryRetrieveHandler, MemoryStoreHandler};

use async_trait::async_trait;
use knowledge::KnowledgeService;
use llm::ModelGateway;
use ::memory::MemoryService;
use platform::{PlatformError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-run state a handler may read
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub user_id: String,
    pub workflow_id: String,
    pub execution_id: String,
    /// Run variables: workflow defaults overlaid with caller bindings
    pub variables: Map<String, Value>,
    /// Outputs of already-completed nodes, keyed by node id
    pub node_outputs: HashMap<String, Value>,
}

impl NodeContext {
    /// Flatten variables and node outputs into one object for condition
    /// evaluation. A node id shadows a variable of the same name.
    pub fn expression_context(&self) -> Value {
        let mut merged = self.variables.clone();
        for (node_id, output) in &self.node_outputs {
            merged.insert(node_id.clone(), output.clone());
        }
        Value::Object(merged)
    }
}

/// One node type's execution semantics.
///
/// The engine resolves `{placeholder}` substitutions in the node's config
/// before dispatch, so handlers see final values. The returned JSON object
/// becomes the node's output, feeds downstream `{nodeId.field}`
/// placeholders, and may carry a `cost` field the engine accumulates into
/// the execution total.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Type name this handler is registered under
    fn node_type(&self) -> &'static str;

    /// Run the node against its resolved configuration
    async fn execute(&self, ctx: &NodeContext, config: &HashMap<String, Value>) -> Result<Value>;
}

impl std::fmt::Debug for dyn NodeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandler")
            .field("node_type", &self.node_type())
            .finish()
    }
}

/// Type-name → handler dispatch table
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in handler set
    pub fn standard(
        gateway: Arc<ModelGateway>,
        knowledge: Arc<KnowledgeService>,
        memory: MemoryService,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AiCallHandler::new(gateway)));
        registry.register(Arc::new(KnowledgeSearchHandler::new(knowledge)));
        registry.register(Arc::new(MemoryStoreHandler::new(memory.clone())));
        registry.register(Arc::new(MemoryRetrieveHandler::new(memory)));
        registry.register(Arc::new(ConditionHandler));
        registry.register(Arc::new(DataTransformHandler));
        registry
    }

    /// Register a handler under its own type name, replacing any previous
    /// registration for that name.
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        self.handlers
            .insert(handler.node_type().to_string(), handler);
    }

    pub fn get(&self, node_type: &str) -> Result<Arc<dyn NodeHandler>> {
        self.handlers
            .get(node_type)
            .cloned()
            .ok_or_else(|| PlatformError::UnknownNodeType(node_type.to_string()))
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.handlers.contains_key(node_type)
    }

    /// Registered type names, for definition validation
    pub fn node_types(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

/// Read a required string field from a resolved config
pub(crate) fn required_str<'a>(config: &'a HashMap<String, Value>, key: &str) -> Result<&'a str> {
    config
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| PlatformError::validation(format!("node config is missing '{key}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NullHandler;

    #[async_trait]
    impl NodeHandler for NullHandler {
        fn node_type(&self) -> &'static str {
            "null_op"
        }

        async fn execute(&self, _ctx: &NodeContext, _config: &HashMap<String, Value>) -> Result<Value> {
            Ok(json!({}))
        }
    }

    #[test]
    fn test_registry_lookup_and_unknown_type() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(NullHandler));

        assert!(registry.contains("null_op"));
        assert!(registry.get("null_op").is_ok());
        assert_eq!(registry.node_types(), vec!["null_op".to_string()]);

        let err = registry.get("teleport").unwrap_err();
        assert!(matches!(err, PlatformError::UnknownNodeType(t) if t == "teleport"));
    }

    #[test]
    fn test_expression_context_merges_outputs_over_variables() {
        let mut variables = Map::new();
        variables.insert("topic".to_string(), json!("rust"));
        variables.insert("fetch".to_string(), json!("shadowed"));
        let mut node_outputs = HashMap::new();
        node_outputs.insert("fetch".to_string(), json!({"cost": 0.5}));

        let ctx = NodeContext {
            user_id: "user-1".to_string(),
            workflow_id: "wf-1".to_string(),
            execution_id: "exec-1".to_string(),
            variables,
            node_outputs,
        };

        let merged = ctx.expression_context();
        assert_eq!(merged["topic"], json!("rust"));
        assert_eq!(merged["fetch"]["cost"], json!(0.5));
    }
}
