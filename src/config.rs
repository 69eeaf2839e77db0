//! Engine configuration: filtering thresholds, generation limits, and
//! LLM provider settings. All floors are tunable, not load-bearing constants.

use serde::{Deserialize, Serialize};

/// Thresholds and limits for a processing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum classifier similarity before a review gets a domain at all.
    pub min_similarity: f64,
    /// Minimum relevance score for acceptance.
    pub min_relevance: f64,
    /// Minimum self-reported confidence for acceptance.
    pub min_confidence: u8,
    /// Minimum project/domain relevance before a missing domain is worth
    /// generating a review for.
    pub generation_relevance_floor: f64,
    /// Weight discount applied to artificial reviews during aggregation.
    pub synthetic_discount: f64,
    /// Dimensions averaging below this feed the recommendation list.
    pub concern_threshold: f64,
    /// Domain dimensions averaging at or above this count as strengths.
    pub strength_threshold: f64,
    /// Domain dimensions averaging at or below this count as concerns.
    pub weakness_threshold: f64,
    /// Core domains that must be covered; `None` means every ontology domain.
    pub core_domains: Option<Vec<String>>,
    /// Retry budget for a single generation call.
    pub max_retries: u32,
    /// Base delay between generation retries, in seconds (doubled per retry).
    pub retry_base_delay_secs: u64,
    /// Deadline for a single generation call, in seconds.
    pub generation_timeout_secs: u64,
    /// How many synthetic generations may be in flight at once.
    pub generation_concurrency: usize,
    /// Cap on the recommendation list.
    pub max_recommendations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.10,
            min_relevance: 0.3,
            min_confidence: 20,
            generation_relevance_floor: 0.2,
            synthetic_discount: 0.5,
            concern_threshold: 3.0,
            strength_threshold: 4.0,
            weakness_threshold: 2.5,
            core_domains: None,
            max_retries: 3,
            retry_base_delay_secs: 2,
            generation_timeout_secs: 30,
            generation_concurrency: 2,
            max_recommendations: 5,
        }
    }
}

/// Connection settings for the generative-text backend. The wire format is
/// OpenAI-compatible chat completions, so `base_url` can point at OpenAI or
/// a local Ollama endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: "dummy-api-key".to_string(),
            model: "gpt-4".to_string(),
            max_tokens: 1000,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Build from environment variables, falling back to defaults.
    /// Reads LLM_API_KEY, LLM_BASE_URL, LLM_MODEL, LLM_MAX_TOKENS.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.api_key = key;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.model = model;
        }
        if let Ok(max_tokens) = std::env::var("LLM_MAX_TOKENS") {
            if let Ok(n) = max_tokens.parse() {
                config.max_tokens = n;
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_floors_match_documented_policy() {
        let config = EngineConfig::default();
        assert_eq!(config.min_relevance, 0.3);
        assert_eq!(config.min_confidence, 20);
        assert_eq!(config.synthetic_discount, 0.5);
        assert!(config.core_domains.is_none());
    }
}
