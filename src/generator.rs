//! Synthetic review generation for uncovered domains. Prompts are built
//! from the ontology snapshot, the backend is called with bounded retries,
//! and the reply is parsed into a review that re-enters the pipeline like
//! any human submission.

use crate::config::EngineConfig;
use crate::error::{ReviewError, Result};
use crate::llm::{complete_with_retry, RetryPolicy, TextGenerator};
use crate::models::{Project, Review, ReviewStatus};
use crate::ontology::{Dimension, OntologySnapshot};
use crate::parser::{parse_review_reply, ScoreParse};
use crate::prompts;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Confidence assigned when the reply carries none; expert-band per the
/// persona the prompt establishes.
const DEFAULT_SYNTHETIC_CONFIDENCE: u8 = 90;

const GENERATION_MAX_TOKENS: u32 = 1000;

pub struct SyntheticReviewGenerator {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl SyntheticReviewGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &EngineConfig) -> Self {
        Self {
            generator,
            policy: RetryPolicy::from_config(config),
        }
    }

    /// Generate a review for `domain_id` from the project text. Fails with
    /// `GenerationFailed` once the retry budget is exhausted; the caller
    /// leaves the domain as a gap and moves on.
    pub async fn generate(
        &self,
        project: &Project,
        domain_id: &str,
        snapshot: &OntologySnapshot,
    ) -> Result<Review> {
        let domain = snapshot.domain(domain_id).ok_or_else(|| {
            ReviewError::GenerationFailed {
                domain: domain_id.to_string(),
                cause: "domain not in ontology".to_string(),
            }
        })?;
        let dimensions: Vec<&Dimension> = snapshot.relevant_dimensions(domain_id);
        let expected: Vec<String> = dimensions.iter().map(|d| d.id.clone()).collect();

        let prompt = prompts::artificial_review_prompt(project, domain, &dimensions);
        info!("Generating artificial {} review for project {}", domain_id, project.project_id);

        let reply = complete_with_retry(
            self.generator.as_ref(),
            &prompt,
            GENERATION_MAX_TOKENS,
            &self.policy,
        )
        .await
        .map_err(|e| ReviewError::GenerationFailed {
            domain: domain_id.to_string(),
            cause: e.to_string(),
        })?;

        let parsed = parse_review_reply(&reply, &expected);
        if parsed.review_text.trim().is_empty() {
            return Err(ReviewError::GenerationFailed {
                domain: domain_id.to_string(),
                cause: "empty review text in reply".to_string(),
            });
        }

        let scores = self.scores_with_defaults(parsed.scores, &expected, domain_id);
        let confidence = parsed.confidence.unwrap_or(DEFAULT_SYNTHETIC_CONFIDENCE);

        let mut review = Review {
            review_id: crate::models::short_id("rev"),
            project_id: project.project_id.clone(),
            reviewer_name: format!("AI {} Reviewer", domain.name),
            text_review: parsed.review_text,
            confidence_score: confidence,
            links: HashMap::new(),
            status: ReviewStatus::Submitted,
            is_artificial: true,
            annotation: Default::default(),
            submitted_at: Utc::now(),
        };
        // Scores travel with the review so the aggregation stage does not
        // need a second backend call for synthetic content.
        review.annotation.sentiment_scores = scores;
        Ok(review)
    }

    fn scores_with_defaults(
        &self,
        parse: ScoreParse,
        expected: &[String],
        domain_id: &str,
    ) -> HashMap<String, f64> {
        match &parse {
            ScoreParse::Parsed(_) => {}
            ScoreParse::PartiallyParsed { missing, .. } => {
                warn!(
                    "Partial score parse for generated {} review; defaulting {:?} to midpoint",
                    domain_id, missing
                );
            }
            ScoreParse::Unparseable => {
                warn!(
                    "No scores parseable from generated {} review; defaulting all to midpoint",
                    domain_id
                );
            }
        }
        parse.with_midpoint_defaults(expected, crate::ontology::Dimension::SCALE_MIDPOINT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::OntologySnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedGenerator {
        reply: String,
        fail_first: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> crate::error::Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(ReviewError::Llm("provider unavailable".to_string()))
            } else {
                Ok(self.reply.clone())
            }
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            retry_base_delay_secs: 0,
            ..EngineConfig::default()
        }
    }

    fn project() -> Project {
        Project::new("TriageBot", "AI triage for clinics", "Built intake and scoring")
    }

    #[tokio::test]
    async fn generates_marked_artificial_review() {
        let reply = "REVIEW: Clinically sound triage flow with clear patient impact.\n\
                     CONFIDENCE: 92\n\
                     SCORES: {\"impact\": 4.0, \"implementation_complexity\": 3.5, \"technical_feasibility\": 4.0}";
        let generator = SyntheticReviewGenerator::new(
            Arc::new(ScriptedGenerator {
                reply: reply.to_string(),
                fail_first: 0,
                calls: AtomicU32::new(0),
            }),
            &config(),
        );
        let snapshot = OntologySnapshot::builtin();
        let review = generator.generate(&project(), "clinical", &snapshot).await.unwrap();

        assert!(review.is_artificial);
        assert_eq!(review.confidence_score, 92);
        assert_eq!(review.reviewer_name, "AI Clinical Reviewer");
        assert_eq!(review.annotation.sentiment_scores.len(), 3);
        assert_eq!(review.annotation.sentiment_scores["impact"], 4.0);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let reply = "REVIEW: fine\nCONFIDENCE: 90\nSCORES: {\"impact\": 3.0, \"implementation_complexity\": 3.0, \"technical_feasibility\": 3.0}";
        let scripted = Arc::new(ScriptedGenerator {
            reply: reply.to_string(),
            fail_first: 2,
            calls: AtomicU32::new(0),
        });
        let generator = SyntheticReviewGenerator::new(scripted.clone(), &config());
        let snapshot = OntologySnapshot::builtin();
        let review = generator.generate(&project(), "clinical", &snapshot).await.unwrap();
        assert!(review.is_artificial);
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_generation_failed() {
        let generator = SyntheticReviewGenerator::new(
            Arc::new(ScriptedGenerator {
                reply: String::new(),
                fail_first: u32::MAX,
                calls: AtomicU32::new(0),
            }),
            &config(),
        );
        let snapshot = OntologySnapshot::builtin();
        let err = generator.generate(&project(), "clinical", &snapshot).await.unwrap_err();
        match err {
            ReviewError::GenerationFailed { domain, .. } => assert_eq!(domain, "clinical"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn missing_dimensions_default_to_midpoint() {
        let reply = "REVIEW: narrow but useful take\nCONFIDENCE: 85\nSCORES: {\"impact\": 5.0}";
        let generator = SyntheticReviewGenerator::new(
            Arc::new(ScriptedGenerator {
                reply: reply.to_string(),
                fail_first: 0,
                calls: AtomicU32::new(0),
            }),
            &config(),
        );
        let snapshot = OntologySnapshot::builtin();
        let review = generator.generate(&project(), "clinical", &snapshot).await.unwrap();
        assert_eq!(review.annotation.sentiment_scores["impact"], 5.0);
        assert_eq!(review.annotation.sentiment_scores["implementation_complexity"], 3.0);
        assert_eq!(review.annotation.sentiment_scores["technical_feasibility"], 3.0);
    }
}
