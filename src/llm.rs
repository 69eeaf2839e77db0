//! Generative-text backend. The engine only depends on the `TextGenerator`
//! trait; `LlmClient` is the production implementation speaking the
//! OpenAI-compatible chat-completions format, which also covers local
//! Ollama deployments via `base_url`.

use crate::config::LlmConfig;
use crate::error::{ReviewError, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce review-like text for a prompt. May fail with `LlmTimeout`
    /// or `Llm` (provider error); callers treat both as recoverable.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

pub struct LlmClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": "You are an expert project reviewer. Follow the response format instructions exactly."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.3,
            "max_tokens": max_tokens.min(self.config.max_tokens)
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReviewError::LlmTimeout(self.config.timeout_secs)
                } else {
                    ReviewError::Llm(format!("LLM API call failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ReviewError::Llm(format!(
                "LLM API returned {}: {}",
                status, detail
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ReviewError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ReviewError::Llm("No content in LLM response".to_string()))?;

        Ok(strip_thinking_tags(content))
    }
}

/// Retry budget for one logical generation call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &crate::config::EngineConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_secs(config.retry_base_delay_secs),
            call_timeout: Duration::from_secs(config.generation_timeout_secs),
        }
    }
}

/// Call the backend with a per-attempt deadline and exponential backoff
/// with jitter between attempts. Timeouts and provider errors are retried
/// alike; the last error surfaces after the budget is spent.
pub async fn complete_with_retry(
    generator: &dyn TextGenerator,
    prompt: &str,
    max_tokens: u32,
    policy: &RetryPolicy,
) -> Result<String> {
    use rand::Rng;

    let mut last_error = None;
    for attempt in 1..=policy.max_attempts {
        let call = generator.complete(prompt, max_tokens);
        let outcome = match tokio::time::timeout(policy.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ReviewError::LlmTimeout(policy.call_timeout.as_secs())),
        };
        match outcome {
            Ok(text) => return Ok(text),
            Err(e) => {
                tracing::warn!("LLM attempt {} of {} failed: {}", attempt, policy.max_attempts, e);
                last_error = Some(e);
                if attempt < policy.max_attempts {
                    let backoff = policy.base_delay * 2u32.saturating_pow(attempt - 1);
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
                    tokio::time::sleep(backoff + jitter).await;
                }
            }
        }
    }
    Err(last_error.unwrap_or_else(|| ReviewError::Llm("no attempts made".to_string())))
}

lazy_static! {
    static ref THINKING_TAGS: Regex =
        Regex::new(r"(?s)<(think|thinking|reasoning)>.*?</(think|thinking|reasoning)>").unwrap();
}

/// Local reasoning models wrap chain-of-thought in think tags; drop it
/// before parsing.
pub fn strip_thinking_tags(text: &str) -> String {
    THINKING_TAGS.replace_all(text, "").trim().to_string()
}
