//! Workflow execution log model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One node attempt inside an execution
///
/// Retried nodes write one row per attempt; skipped nodes get a terminal row
/// with no input/output snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowExecutionLog {
    /// Unique identifier (UUID string)
    pub id: String,

    pub execution_id: String,

    pub node_id: String,
    pub node_type: String,

    /// One of: running, completed, failed, skipped
    pub status: String,

    /// Resolved node config snapshot as JSON
    pub input_data: Option<String>,

    /// Handler output snapshot as JSON
    pub output_data: Option<String>,

    pub error_message: Option<String>,

    pub cost: f64,
    pub duration_ms: Option<i64>,

    pub started_at: String,
    pub completed_at: Option<String>,
}

impl WorkflowExecutionLog {
    pub fn new(id: String, execution_id: String, node_id: String, node_type: String) -> Self {
        Self {
            id,
            execution_id,
            node_id,
            node_type,
            status: "running".to_string(),
            input_data: None,
            output_data: None,
            error_message: None,
            cost: 0.0,
            duration_ms: None,
            started_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
        }
    }

    /// Terminal row for a node that never became ready
    pub fn skipped(id: String, execution_id: String, node_id: String, node_type: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            execution_id,
            node_id,
            node_type,
            status: "skipped".to_string(),
            input_data: None,
            output_data: None,
            error_message: None,
            cost: 0.0,
            duration_ms: None,
            started_at: now.clone(),
            completed_at: Some(now),
        }
    }

    pub fn with_input(mut self, input_data: impl Into<String>) -> Self {
        self.input_data = Some(input_data.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }

    pub fn is_skipped(&self) -> bool {
        self.status == "skipped"
    }
}
