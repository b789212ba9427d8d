//! Workflow model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user-authored workflow graph
///
/// `definition` is the JSON `{nodes, edges}` document; `variables` holds
/// default bindings merged under each execution's input; `settings` overrides
/// the engine defaults (timeout, error strategy, retry policy). Only `active`
/// workflows may be executed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Workflow {
    /// Unique identifier (UUID string)
    pub id: String,

    /// Owning user
    pub user_id: String,

    pub name: String,
    pub description: Option<String>,

    /// Graph definition as JSON
    pub definition: String,

    /// One of: draft, active, inactive, archived
    pub status: String,

    /// Default variable bindings as JSON
    pub variables: String,

    /// JSON execution settings overrides
    pub settings: String,

    pub is_public: bool,

    pub execution_count: i64,
    pub last_executed_at: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

impl Workflow {
    pub fn new(id: String, user_id: String, name: String, definition: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            user_id,
            name,
            description: None,
            definition,
            status: "draft".to_string(),
            variables: "{}".to_string(),
            settings: "{}".to_string(),
            is_public: false,
            execution_count: 0,
            last_executed_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_variables(mut self, variables: impl Into<String>) -> Self {
        self.variables = variables.into();
        self
    }

    pub fn with_settings(mut self, settings: impl Into<String>) -> Self {
        self.settings = settings.into();
        self
    }

    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }

    pub fn is_draft(&self) -> bool {
        self.status == "draft"
    }

    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    pub fn is_archived(&self) -> bool {
        self.status == "archived"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_creation() {
        let definition = r#"{"nodes": [{"id": "start", "type": "data_transform"}], "edges": []}"#;
        let workflow = Workflow::new(
            "workflow-1".to_string(),
            "user-1".to_string(),
            "Test Workflow".to_string(),
            definition.to_string(),
        );

        assert_eq!(workflow.id, "workflow-1");
        assert_eq!(workflow.definition, definition);
        assert!(workflow.is_draft());
        assert_eq!(workflow.variables, "{}");
        assert_eq!(workflow.execution_count, 0);
    }

    #[test]
    fn test_workflow_status_checks() {
        let mut workflow = Workflow::new(
            "workflow-1".to_string(),
            "user-1".to_string(),
            "Test Workflow".to_string(),
            r#"{"nodes": [], "edges": []}"#.to_string(),
        );

        assert!(workflow.is_draft());
        assert!(!workflow.is_active());

        workflow.status = "active".to_string();
        assert!(workflow.is_active());

        workflow.status = "archived".to_string();
        assert!(workflow.is_archived());
    }
}
