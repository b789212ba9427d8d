//! `data_transform` node: named transforms over a resolved input string.

use super::{NodeContext, NodeHandler};
use async_trait::async_trait;
use platform::Result;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Applies config `transform_type` to config `input_data`:
///
/// - `json_parse` — decode the input as JSON; malformed input yields
///   `null` rather than failing the node
/// - `json_encode` — wrap the input in a JSON string literal
/// - anything else — identity passthrough
///
/// `transform_type` defaults to `json_parse`.
pub struct DataTransformHandler;

#[async_trait]
impl NodeHandler for DataTransformHandler {
    fn node_type(&self) -> &'static str {
        "data_transform"
    }

    async fn execute(&self, _ctx: &NodeContext, config: &HashMap<String, Value>) -> Result<Value> {
        let input = match config.get("input_data") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let transform_type = config
            .get("transform_type")
            .and_then(Value::as_str)
            .unwrap_or("json_parse");

        let output = match transform_type {
            "json_parse" => serde_json::from_str(&input).unwrap_or(Value::Null),
            "json_encode" => Value::String(Value::String(input).to_string()),
            _ => Value::String(input),
        };

        Ok(json!({ "output_data": output }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn ctx() -> NodeContext {
        NodeContext {
            user_id: "user-1".to_string(),
            workflow_id: "wf-1".to_string(),
            execution_id: "exec-1".to_string(),
            variables: Map::new(),
            node_outputs: HashMap::new(),
        }
    }

    fn config(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_json_parse_is_the_default_transform() {
        let out = DataTransformHandler
            .execute(&ctx(), &config(&[("input_data", json!(r#"{"a": 1}"#))]))
            .await
            .unwrap();
        assert_eq!(out["output_data"], json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_json_parse_of_malformed_input_yields_null() {
        let out = DataTransformHandler
            .execute(&ctx(), &config(&[("input_data", json!("{nope"))]))
            .await
            .unwrap();
        assert_eq!(out["output_data"], Value::Null);
    }

    #[tokio::test]
    async fn test_json_encode_wraps_in_string_literal() {
        let out = DataTransformHandler
            .execute(
                &ctx(),
                &config(&[
                    ("input_data", json!("hello")),
                    ("transform_type", json!("json_encode")),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(out["output_data"], json!("\"hello\""));
    }

    #[tokio::test]
    async fn test_unknown_transform_passes_through() {
        let out = DataTransformHandler
            .execute(
                &ctx(),
                &config(&[
                    ("input_data", json!("as-is")),
                    ("transform_type", json!("upper")),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(out["output_data"], json!("as-is"));
    }
}
