//! Per-dimension sentiment scoring of review text via the generative
//! backend. A review is scored only on its assigned domain's relevant
//! dimensions; when the backend or parser fails, scores fall back to the
//! scale midpoint so one bad reply never sinks a whole run.

use crate::config::EngineConfig;
use crate::llm::{complete_with_retry, RetryPolicy, TextGenerator};
use crate::ontology::{Dimension, OntologySnapshot};
use crate::parser::{parse_score_block, ScoreParse};
use crate::prompts;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

const SCORING_MAX_TOKENS: u32 = 400;

pub struct SentimentScorer {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl SentimentScorer {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &EngineConfig) -> Self {
        Self {
            generator,
            policy: RetryPolicy::from_config(config),
        }
    }

    /// Score `review_text` on the domain's relevant dimensions. Infallible
    /// by design: backend failure degrades to midpoint scores and is
    /// reported through the returned warning.
    pub async fn score(
        &self,
        review_text: &str,
        domain_id: &str,
        snapshot: &OntologySnapshot,
    ) -> (HashMap<String, f64>, Option<String>) {
        let dimensions: Vec<&Dimension> = snapshot.relevant_dimensions(domain_id);
        if dimensions.is_empty() {
            return (HashMap::new(), None);
        }
        let expected: Vec<String> = dimensions.iter().map(|d| d.id.clone()).collect();
        let prompt = prompts::score_extraction_prompt(review_text, &dimensions);

        let parse = match complete_with_retry(
            self.generator.as_ref(),
            &prompt,
            SCORING_MAX_TOKENS,
            &self.policy,
        )
        .await
        {
            Ok(reply) => parse_score_block(&reply, &expected),
            Err(e) => {
                warn!("Sentiment scoring call failed: {}", e);
                ScoreParse::Unparseable
            }
        };

        let warning = match &parse {
            ScoreParse::Parsed(_) => None,
            ScoreParse::PartiallyParsed { missing, .. } => Some(format!(
                "partial sentiment parse, midpoint-defaulted: {}",
                missing.join(", ")
            )),
            ScoreParse::Unparseable => {
                Some("sentiment scoring unparseable, all dimensions midpoint-defaulted".to_string())
            }
        };

        (
            parse.with_midpoint_defaults(&expected, Dimension::SCALE_MIDPOINT),
            warning,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReviewError;
    use async_trait::async_trait;

    struct FixedReply(String);

    #[async_trait]
    impl TextGenerator for FixedReply {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> crate::error::Result<String> {
            Ok(self.0.clone())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl TextGenerator for AlwaysFails {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> crate::error::Result<String> {
            Err(ReviewError::Llm("down".to_string()))
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            retry_base_delay_secs: 0,
            max_retries: 1,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn scores_relevant_dimensions_only() {
        let reply = r#"{"return_on_investment": 4.0, "scalability": 3.5, "impact": 4.5, "innovation": 5.0}"#;
        let scorer = SentimentScorer::new(Arc::new(FixedReply(reply.to_string())), &config());
        let snapshot = OntologySnapshot::builtin();
        let (scores, warning) = scorer.score("great margins", "business", &snapshot).await;
        assert!(warning.is_none());
        // Business relevant dimensions: roi, scalability, impact.
        assert_eq!(scores.len(), 3);
        assert!(!scores.contains_key("innovation"));
    }

    #[tokio::test]
    async fn backend_failure_degrades_to_midpoints() {
        let scorer = SentimentScorer::new(Arc::new(AlwaysFails), &config());
        let snapshot = OntologySnapshot::builtin();
        let (scores, warning) = scorer.score("text", "business", &snapshot).await;
        assert!(warning.is_some());
        assert_eq!(scores.len(), 3);
        assert!(scores.values().all(|s| *s == 3.0));
    }
}
