//! `ai_call` node: send a resolved prompt through the model gateway.

use super::{required_str, NodeContext, NodeHandler};
use async_trait::async_trait;
use llm::{CallOptions, ModelGateway, OPERATION_WORKFLOW};
use platform::llm::ChatMessage;
use platform::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Invokes the gateway with config `prompt`, an optional `model` override,
/// and optional `parameters` (`temperature`, `max_tokens`). Output carries
/// the response text, total token count, and the call's cost.
pub struct AiCallHandler {
    gateway: Arc<ModelGateway>,
}

impl AiCallHandler {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl NodeHandler for AiCallHandler {
    fn node_type(&self) -> &'static str {
        "ai_call"
    }

    async fn execute(&self, ctx: &NodeContext, config: &HashMap<String, Value>) -> Result<Value> {
        let prompt = required_str(config, "prompt")?;
        let model_override = config.get("model").and_then(Value::as_str);
        let model = self.gateway.resolve(model_override, None).await?;

        let mut options = CallOptions::default().with_operation(OPERATION_WORKFLOW);
        if let Some(params) = config.get("parameters").and_then(Value::as_object) {
            if let Some(temperature) = params.get("temperature").and_then(Value::as_f64) {
                options = options.with_temperature(temperature);
            }
            if let Some(max_tokens) = params.get("max_tokens").and_then(Value::as_i64) {
                options = options.with_max_tokens(max_tokens);
            }
        }

        let outcome = self
            .gateway
            .call(&ctx.user_id, &model, vec![ChatMessage::user(prompt)], options)
            .await?;

        Ok(json!({
            "response": outcome.content,
            "tokens_used": outcome.input_tokens + outcome.output_tokens,
            "cost": outcome.cost,
        }))
    }
}
