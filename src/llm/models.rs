use serde::Deserialize;

/// Models available for plan generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    /// Speed tier - fast, cheap model for classification-grade work
    Speed,
    /// Balanced tier - good reasoning at medium cost, default for review plans
    Balanced,
}

/// Maximum tokens for all model tiers
const MODEL_MAX_TOKENS: u32 = 16384;

impl Model {
    pub fn id(&self) -> &'static str {
        match self {
            Model::Speed => "openai/gpt-oss-120b:nitro",
            Model::Balanced => "anthropic/claude-sonnet-4.5:nitro",
        }
    }

    pub fn max_tokens(&self) -> u32 {
        MODEL_MAX_TOKENS
    }

    /// Whether this model supports strict JSON-schema structured outputs.
    pub fn supports_structured_outputs(&self) -> bool {
        matches!(self, Model::Speed | Model::Balanced)
    }
}

/// API usage information from OpenRouter
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    /// Actual cost in USD as reported by OpenRouter.
    /// OpenRouter returns this as `total_cost` in the usage object.
    #[serde(default, alias = "total_cost")]
    pub cost: Option<f64>,
}

impl Usage {
    /// Cost reported by OpenRouter, or 0.0 if not available.
    /// We don't estimate costs - hardcoded rates are always wrong.
    pub fn cost(&self) -> f64 {
        self.cost.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ids() {
        assert!(Model::Speed.id().contains("gpt"));
        assert!(Model::Balanced.id().contains("claude"));
    }

    #[test]
    fn test_model_supports_structured_outputs() {
        assert!(Model::Speed.supports_structured_outputs());
        assert!(Model::Balanced.supports_structured_outputs());
    }

    #[test]
    fn test_usage_returns_actual_cost() {
        let usage = Usage {
            prompt_tokens: 1000,
            completion_tokens: 1000,
            total_tokens: 2000,
            cost: Some(0.05),
        };
        assert_eq!(usage.cost(), 0.05);
    }

    #[test]
    fn test_usage_deserialize_with_total_cost() {
        // OpenRouter returns "total_cost" in the usage object
        let json = r#"{"prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150, "total_cost": 0.0025}"#;
        let usage: Usage = serde_json::from_str(json).unwrap();
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(usage.cost(), 0.0025);
    }
}
