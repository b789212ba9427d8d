//! `condition` node: evaluate a sandboxed boolean expression.

use super::{required_str, NodeContext, NodeHandler};
use crate::condition;
use async_trait::async_trait;
use platform::Result;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Evaluates config `condition` against the run's variables and prior
/// node outputs. The expression grammar is the sandboxed one in
/// [`crate::condition`]; there is no host-language evaluation of any
/// kind.
pub struct ConditionHandler;

#[async_trait]
impl NodeHandler for ConditionHandler {
    fn node_type(&self) -> &'static str {
        "condition"
    }

    async fn execute(&self, ctx: &NodeContext, config: &HashMap<String, Value>) -> Result<Value> {
        let expression = required_str(config, "condition")?;
        let result = condition::evaluate(expression, &ctx.expression_context())?;
        Ok(json!({ "result": result }))
    }
}
