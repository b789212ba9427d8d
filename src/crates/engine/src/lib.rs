//! Workflow execution engine for the agentry platform.
//!
//! Workflows are directed acyclic graphs of typed nodes stored as JSON.
//! This crate owns everything between that JSON and a terminal execution
//! record:
//!
//! - [`graph`] — definition parsing and full-list validation, including
//!   cycle detection
//! - [`vars`] — `{variable}` / `{nodeId.field}` placeholder substitution
//! - [`condition`] — the sandboxed boolean expression evaluator behind
//!   condition nodes
//! - [`handlers`] — the [`NodeHandler`] dispatch table and the built-in
//!   node set (ai_call, knowledge_search, memory_store, memory_retrieve,
//!   condition, data_transform)
//! - [`engine`] — topological execution with per-node logging, cost and
//!   progress accounting, cancellation, and configurable error strategy

pub mod condition;
pub mod engine;
pub mod graph;
pub mod handlers;
pub mod vars;

pub use engine::{EngineSettings, ErrorStrategy, ExecutionEngine, ExecutionProgress};
pub use graph::{WorkflowDefinition, WorkflowEdge, WorkflowNode};
pub use handlers::{
    AiCallHandler, ConditionHandler, DataTransformHandler, HandlerRegistry,
    KnowledgeSearchHandler, MemoryRetrieveHandler, MemoryStoreHandler, NodeContext, NodeHandler,
};
