//! Workflow execution model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One run of a workflow
///
/// Status machine: pending -> running -> completed | failed | cancelled, with
/// pending -> cancelled also allowed. Transitions go through the repository's
/// conditional updates so two callers cannot both move the same row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowExecution {
    /// Unique identifier (UUID string)
    pub id: String,

    pub workflow_id: String,
    pub user_id: String,

    /// One of: pending, running, completed, failed, cancelled
    pub status: String,

    /// Caller-supplied input as JSON
    pub input_data: String,

    /// Workflow defaults merged with input, as JSON
    pub variables: String,

    /// Node outputs keyed by node id, as JSON, set on completion
    pub output_data: Option<String>,

    pub error_message: Option<String>,

    pub total_nodes: i64,
    pub completed_nodes: i64,
    pub failed_nodes: i64,

    /// Accumulated cost across node calls in USD
    pub total_cost: f64,

    pub started_at: Option<String>,
    pub completed_at: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

impl WorkflowExecution {
    pub fn new(id: String, workflow_id: String, user_id: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            workflow_id,
            user_id,
            status: "pending".to_string(),
            input_data: "{}".to_string(),
            variables: "{}".to_string(),
            output_data: None,
            error_message: None,
            total_nodes: 0,
            completed_nodes: 0,
            failed_nodes: 0,
            total_cost: 0.0,
            started_at: None,
            completed_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_input(mut self, input_data: impl Into<String>) -> Self {
        self.input_data = input_data.into();
        self
    }

    pub fn with_variables(mut self, variables: impl Into<String>) -> Self {
        self.variables = variables.into();
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == "pending"
    }

    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == "cancelled"
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "failed" | "cancelled")
    }

    /// Wall-clock duration, available once both timestamps are set
    pub fn execution_time_ms(&self) -> Option<i64> {
        let started = chrono::DateTime::parse_from_rfc3339(self.started_at.as_deref()?).ok()?;
        let completed = chrono::DateTime::parse_from_rfc3339(self.completed_at.as_deref()?).ok()?;
        Some((completed - started).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution() -> WorkflowExecution {
        WorkflowExecution::new(
            "exec-1".to_string(),
            "workflow-1".to_string(),
            "user-1".to_string(),
        )
    }

    #[test]
    fn test_execution_starts_pending() {
        let execution = execution();

        assert!(execution.is_pending());
        assert!(!execution.is_terminal());
        assert_eq!(execution.total_cost, 0.0);
        assert!(execution.execution_time_ms().is_none());
    }

    #[test]
    fn test_terminal_states() {
        let mut execution = execution();

        for status in ["completed", "failed", "cancelled"] {
            execution.status = status.to_string();
            assert!(execution.is_terminal(), "{status} should be terminal");
        }

        execution.status = "running".to_string();
        assert!(!execution.is_terminal());
    }

    #[test]
    fn test_execution_time_from_timestamps() {
        let mut execution = execution();
        execution.started_at = Some("2024-05-01T10:00:00+00:00".to_string());
        execution.completed_at = Some("2024-05-01T10:00:02.500+00:00".to_string());

        assert_eq!(execution.execution_time_ms(), Some(2500));
    }
}
