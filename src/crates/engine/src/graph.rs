//! Workflow graph model: parsing and validation of the `{nodes, edges}`
//! definition JSON.
//!
//! Validation collects every violation rather than stopping at the first,
//! so a caller can report all problems in one pass. Parsing is the strict
//! counterpart used by the execution path once a definition has passed
//! validation.

use platform::{PlatformError, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

/// One step in a workflow graph
#[derive(Debug, Clone)]
pub struct WorkflowNode {
    /// Node identifier, unique within the workflow
    pub id: String,
    /// Handler type name (ai_call, condition, ...)
    pub node_type: String,
    /// Handler configuration
    pub config: HashMap<String, Value>,
}

/// Directed dependency between two nodes
#[derive(Debug, Clone)]
pub struct WorkflowEdge {
    pub source: String,
    pub target: String,
}

/// A decoded workflow definition
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
}

impl WorkflowDefinition {
    /// Parse a definition JSON string into nodes and edges.
    ///
    /// Shape problems (missing ids, non-string endpoints) fail fast here;
    /// use [`WorkflowDefinition::validate`] to gather the full violation
    /// list instead.
    pub fn parse(definition: &str) -> Result<Self> {
        let def: Value = serde_json::from_str(definition)
            .map_err(|e| PlatformError::validation(format!("invalid workflow JSON: {e}")))?;

        let mut nodes = Vec::new();
        if let Some(arr) = def.get("nodes").and_then(Value::as_array) {
            for node in arr {
                let id = node
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PlatformError::validation("node is missing an id"))?;
                let node_type = node
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        PlatformError::validation(format!("node '{id}' is missing a type"))
                    })?;
                let config = node
                    .get("config")
                    .and_then(Value::as_object)
                    .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();

                nodes.push(WorkflowNode {
                    id: id.to_string(),
                    node_type: node_type.to_string(),
                    config,
                });
            }
        }

        let mut edges = Vec::new();
        if let Some(arr) = def.get("edges").and_then(Value::as_array) {
            for edge in arr {
                let source = edge
                    .get("source")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PlatformError::validation("edge is missing a source"))?;
                let target = edge
                    .get("target")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PlatformError::validation("edge is missing a target"))?;

                edges.push(WorkflowEdge {
                    source: source.to_string(),
                    target: target.to_string(),
                });
            }
        }

        Ok(Self { nodes, edges })
    }

    /// Check a raw definition against the structural rules and a registry of
    /// known node types. Returns every violation found, empty when valid.
    pub fn validate(definition: &str, known_types: &[String]) -> Vec<String> {
        let def: Value = match serde_json::from_str(definition) {
            Ok(v) => v,
            Err(e) => return vec![format!("workflow definition is not valid JSON: {e}")],
        };

        let mut errors = Vec::new();

        let nodes = def.get("nodes").and_then(Value::as_array);
        if nodes.is_none() {
            errors.push("workflow must have a nodes array".to_string());
        }
        let edges = def.get("edges").and_then(Value::as_array);
        if edges.is_none() {
            errors.push("workflow must have an edges array".to_string());
        }

        let mut node_ids: HashSet<&str> = HashSet::new();
        if let Some(nodes) = nodes {
            if nodes.is_empty() {
                errors.push("workflow must have at least one node".to_string());
            }
            for (index, node) in nodes.iter().enumerate() {
                let id = node.get("id").and_then(Value::as_str);
                match id {
                    None => errors.push(format!("node at index {index} is missing an id")),
                    Some(id) if !node_ids.insert(id) => {
                        errors.push(format!("duplicate node id '{id}'"));
                    }
                    Some(_) => {}
                }
                let label = id.map_or_else(|| format!("at index {index}"), |id| format!("'{id}'"));
                match node.get("type").and_then(Value::as_str) {
                    None => errors.push(format!("node {label} is missing a type")),
                    Some(t) if !known_types.iter().any(|k| k == t) => {
                        errors.push(format!("node {label} has unknown type '{t}'"));
                    }
                    Some(_) => {}
                }
            }
        }

        // Edges may only connect defined nodes; only well-formed edges
        // participate in cycle detection.
        let mut resolved_edges: Vec<(&str, &str)> = Vec::new();
        if let Some(edges) = edges {
            for (index, edge) in edges.iter().enumerate() {
                let source = edge.get("source").and_then(Value::as_str);
                let target = edge.get("target").and_then(Value::as_str);
                if source.is_none() {
                    errors.push(format!("edge at index {index} is missing a source"));
                }
                if target.is_none() {
                    errors.push(format!("edge at index {index} is missing a target"));
                }
                let (Some(source), Some(target)) = (source, target) else {
                    continue;
                };
                let mut dangling = false;
                if !node_ids.contains(source) {
                    errors.push(format!("edge source '{source}' is not a defined node"));
                    dangling = true;
                }
                if !node_ids.contains(target) {
                    errors.push(format!("edge target '{target}' is not a defined node"));
                    dangling = true;
                }
                if !dangling {
                    resolved_edges.push((source, target));
                }
            }
        }

        if has_cycle(&node_ids, &resolved_edges) {
            errors.push("workflow graph contains a cycle".to_string());
        }

        errors
    }

    /// Validate and parse in one step, turning a non-empty violation list
    /// into a [`PlatformError::Validation`].
    pub fn validated(definition: &str, known_types: &[String]) -> Result<Self> {
        let errors = Self::validate(definition, known_types);
        if !errors.is_empty() {
            return Err(PlatformError::Validation { errors });
        }
        Self::parse(definition)
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Nodes with no incoming edge, in definition order
    pub fn start_nodes(&self) -> Vec<&WorkflowNode> {
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.target.as_str()).collect();
        self.nodes
            .iter()
            .filter(|n| !targets.contains(n.id.as_str()))
            .collect()
    }

    /// Targets of every edge leaving the given node
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.source == id)
            .map(|e| e.target.as_str())
            .collect()
    }
}

/// Kahn's algorithm: if peeling zero-in-degree nodes cannot visit every
/// node, the leftover nodes sit on a cycle.
fn has_cycle(node_ids: &HashSet<&str>, edges: &[(&str, &str)]) -> bool {
    let mut in_degree: HashMap<&str, usize> = node_ids.iter().map(|id| (*id, 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for (source, target) in edges {
        *in_degree.entry(target).or_insert(0) += 1;
        successors.entry(source).or_default().push(target);
    }

    let mut ready: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0usize;
    while let Some(id) = ready.pop_front() {
        visited += 1;
        if let Some(next) = successors.get(id) {
            for target in next {
                let degree = in_degree.get_mut(target).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(target);
                }
            }
        }
    }

    visited < node_ids.len()
}
