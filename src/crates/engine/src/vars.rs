//! Placeholder substitution for node configuration.
//!
//! Two placeholder forms are recognized: `{variableName}` drawn from the
//! run's variable bindings, and `{nodeId.fieldName}` drawn from a prior
//! node's output object. Substitution is textual, not expression
//! evaluation, and a placeholder with no binding passes through unchanged
//! so optional bindings never fail a workflow.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Substitute placeholders in a single string.
///
/// Variables are applied before node outputs, and only object-shaped node
/// outputs contribute `{nodeId.field}` replacements. String values are
/// inserted verbatim; anything else is inserted as its JSON text.
pub fn resolve_text(
    text: &str,
    variables: &Map<String, Value>,
    node_outputs: &HashMap<String, Value>,
) -> String {
    let mut resolved = text.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{key}}}");
        if resolved.contains(&placeholder) {
            resolved = resolved.replace(&placeholder, &replacement(value));
        }
    }

    for (node_id, output) in node_outputs {
        let Value::Object(fields) = output else {
            continue;
        };
        for (field, value) in fields {
            let placeholder = format!("{{{node_id}.{field}}}");
            if resolved.contains(&placeholder) {
                resolved = resolved.replace(&placeholder, &replacement(value));
            }
        }
    }

    resolved
}

/// Substitute placeholders in every string reachable inside a JSON value.
///
/// Objects and arrays are walked recursively; non-string leaves are
/// returned untouched.
pub fn resolve_value(
    value: &Value,
    variables: &Map<String, Value>,
    node_outputs: &HashMap<String, Value>,
) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_text(s, variables, node_outputs)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_value(v, variables, node_outputs))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, variables, node_outputs)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolve a whole node configuration map before handler dispatch
pub fn resolve_config(
    config: &HashMap<String, Value>,
    variables: &Map<String, Value>,
    node_outputs: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    config
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, variables, node_outputs)))
        .collect()
}

fn replacement(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn variables(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_resolves_workflow_variables() {
        let vars = variables(&[("topic", json!("rust")), ("count", json!(3))]);
        let out = resolve_text("write {count} facts about {topic}", &vars, &HashMap::new());
        assert_eq!(out, "write 3 facts about rust");
    }

    #[test]
    fn test_resolves_node_output_fields() {
        let mut outputs = HashMap::new();
        outputs.insert(
            "fetch".to_string(),
            json!({"response": "the sky is blue", "cost": 0.01}),
        );
        let out = resolve_text("summarize: {fetch.response}", &Map::new(), &outputs);
        assert_eq!(out, "summarize: the sky is blue");
    }

    #[test]
    fn test_unresolved_placeholder_passes_through() {
        let vars = variables(&[("known", json!("yes"))]);
        let out = resolve_text("{known} and {unknown} and {ghost.field}", &vars, &HashMap::new());
        assert_eq!(out, "yes and {unknown} and {ghost.field}");
    }

    #[test]
    fn test_non_object_node_output_contributes_nothing() {
        let mut outputs = HashMap::new();
        outputs.insert("raw".to_string(), json!("just a string"));
        let out = resolve_text("{raw.field}", &Map::new(), &outputs);
        assert_eq!(out, "{raw.field}");
    }

    #[test]
    fn test_non_string_values_insert_json_text() {
        let vars = variables(&[("flag", json!(true)), ("data", json!({"a": 1}))]);
        let out = resolve_text("flag={flag} data={data}", &vars, &HashMap::new());
        assert_eq!(out, r#"flag=true data={"a":1}"#);
    }

    #[test]
    fn test_resolve_config_walks_nested_values() {
        let vars = variables(&[("name", json!("ada"))]);
        let mut config = HashMap::new();
        config.insert("prompt".to_string(), json!("hello {name}"));
        config.insert(
            "parameters".to_string(),
            json!({"note": "{name} asked", "temperature": 0.2, "tags": ["{name}", 1]}),
        );

        let resolved = resolve_config(&config, &vars, &HashMap::new());
        assert_eq!(resolved["prompt"], json!("hello ada"));
        assert_eq!(
            resolved["parameters"],
            json!({"note": "ada asked", "temperature": 0.2, "tags": ["ada", 1]})
        );
    }
}
