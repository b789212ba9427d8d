//! AI model catalog entry

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered language model and its pricing/capability metadata
///
/// Reference data shared by all users. The gateway resolves requests against
/// active rows and uses the per-1k token prices for cost accounting.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AiModel {
    /// Unique identifier (UUID string)
    pub id: String,

    /// Provider key, e.g. "openai" or "anthropic"
    pub provider: String,

    /// Provider-scoped model name, e.g. "gpt-3.5-turbo"
    pub model_id: String,

    /// Human-readable display name
    pub display_name: String,

    pub description: Option<String>,

    /// Maximum context window in tokens
    pub max_tokens: i64,

    pub supports_streaming: bool,
    pub supports_functions: bool,
    pub supports_vision: bool,

    /// Price per 1000 input tokens in USD
    pub input_cost_per_1k: f64,

    /// Price per 1000 output tokens in USD
    pub output_cost_per_1k: f64,

    /// Requests allowed per user per minute
    pub rate_limit_per_minute: i64,

    pub is_active: bool,

    /// At most one row should be the system default
    pub is_default: bool,

    pub created_at: String,
    pub updated_at: String,
}

impl AiModel {
    pub fn new(id: String, provider: String, model_id: String, display_name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            provider,
            model_id,
            display_name,
            description: None,
            max_tokens: 4096,
            supports_streaming: true,
            supports_functions: false,
            supports_vision: false,
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
            rate_limit_per_minute: 60,
            is_active: true,
            is_default: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_pricing(mut self, input_cost_per_1k: f64, output_cost_per_1k: f64) -> Self {
        self.input_cost_per_1k = input_cost_per_1k;
        self.output_cost_per_1k = output_cost_per_1k;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_rate_limit(mut self, requests_per_minute: i64) -> Self {
        self.rate_limit_per_minute = requests_per_minute;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// "{provider}:{model_id}", unique across the catalog
    pub fn full_identifier(&self) -> String {
        format!("{}:{}", self.provider, self.model_id)
    }

    /// Cost of a call in USD, rounded to 6 decimal places
    pub fn calculate_cost(&self, input_tokens: i64, output_tokens: i64) -> f64 {
        let cost = (input_tokens as f64 / 1000.0) * self.input_cost_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_cost_per_1k;
        (cost * 1_000_000.0).round() / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_creation_defaults() {
        let model = AiModel::new(
            "model-1".to_string(),
            "openai".to_string(),
            "gpt-3.5-turbo".to_string(),
            "GPT-3.5 Turbo".to_string(),
        );

        assert!(model.is_active);
        assert!(!model.is_default);
        assert!(model.supports_streaming);
        assert_eq!(model.rate_limit_per_minute, 60);
    }

    #[test]
    fn test_full_identifier() {
        let model = AiModel::new(
            "model-1".to_string(),
            "openai".to_string(),
            "gpt-4".to_string(),
            "GPT-4".to_string(),
        );

        assert_eq!(model.full_identifier(), "openai:gpt-4");
    }

    #[test]
    fn test_calculate_cost_rounds_to_six_places() {
        let model = AiModel::new(
            "model-1".to_string(),
            "openai".to_string(),
            "gpt-3.5-turbo".to_string(),
            "GPT-3.5 Turbo".to_string(),
        )
        .with_pricing(0.0015, 0.002);

        // 1500/1000 * 0.0015 + 500/1000 * 0.002 = 0.00225 + 0.001 = 0.00325
        assert_eq!(model.calculate_cost(1500, 500), 0.00325);
    }

    #[test]
    fn test_calculate_cost_zero_tokens() {
        let model = AiModel::new(
            "model-1".to_string(),
            "openai".to_string(),
            "gpt-4".to_string(),
            "GPT-4".to_string(),
        )
        .with_pricing(0.03, 0.06);

        assert_eq!(model.calculate_cost(0, 0), 0.0);
    }
}
