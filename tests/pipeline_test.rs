//! End-to-end pipeline tests against the in-memory store and a scripted
//! generative backend.

use async_trait::async_trait;
use review_engine::config::EngineConfig;
use review_engine::error::{Result, ReviewError};
use review_engine::llm::TextGenerator;
use review_engine::models::{
    ProcessOptions, ProcessingJob, ProcessingStatus, Project, RejectReason, Review,
};
use review_engine::ontology::{OntologySnapshot, OntologyStore};
use review_engine::pipeline::ReviewPipeline;
use review_engine::store::{MemoryStore, ReviewStore};
use std::sync::Arc;
use std::time::Duration;

const TECHNICAL_REPLY: &str = "REVIEW: The software architecture is clean and the code follows \
solid engineering practice. The backend development approach with a server and database API is \
feasible and scalable; implementation complexity is moderate and the approach is innovative.\n\
CONFIDENCE: 90\n\
SCORES: {\"technical_feasibility\": 4.0, \"implementation_complexity\": 3.5, \"scalability\": 4.0, \"innovation\": 4.0}";

const BUSINESS_REPLY: &str = "REVIEW: From a business standpoint the market opportunity is real \
and the monetization strategy credible. Revenue potential and return on investment look strong, \
the model is scalable, and the impact on the market is significant.\n\
CONFIDENCE: 88\n\
SCORES: {\"return_on_investment\": 4.0, \"scalability\": 4.5, \"impact\": 4.0}";

const SCORING_REPLY: &str =
    "{\"impact\": 4.5, \"implementation_complexity\": 4.0, \"technical_feasibility\": 4.0}";

/// Scripted backend: answers scoring prompts with a fixed JSON block and
/// generation prompts with domain-appropriate review text.
struct MockBackend {
    fail_generation: bool,
}

#[async_trait]
impl TextGenerator for MockBackend {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        if prompt.contains("Analyze the following project review") {
            return Ok(SCORING_REPLY.to_string());
        }
        if self.fail_generation {
            return Err(ReviewError::LlmTimeout(1));
        }
        if prompt.contains("deep expertise in Technical") {
            return Ok(TECHNICAL_REPLY.to_string());
        }
        if prompt.contains("deep expertise in Business") {
            return Ok(BUSINESS_REPLY.to_string());
        }
        Err(ReviewError::Llm(format!(
            "unexpected prompt: {}",
            &prompt[..prompt.len().min(80)]
        )))
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        core_domains: Some(vec![
            "technical".to_string(),
            "clinical".to_string(),
            "business".to_string(),
        ]),
        max_retries: 2,
        retry_base_delay_secs: 0,
        generation_timeout_secs: 5,
        ..EngineConfig::default()
    }
}

fn build_pipeline(fail_generation: bool, config: EngineConfig) -> (ReviewPipeline, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let pipeline = ReviewPipeline::new(
        store.clone(),
        Arc::new(OntologyStore::new(OntologySnapshot::builtin())),
        Arc::new(MockBackend { fail_generation }),
        config,
    );
    (pipeline, store)
}

async fn seed_project(store: &MemoryStore) -> Project {
    let project = Project::new(
        "CareTrack",
        "A software platform for clinics with a web app, backend API and database. \
         The business model targets hospital revenue and monetization.",
        "Built the patient intake flow and a working demo for doctors.",
    );
    store.insert_project(&project).await.unwrap();
    project
}

fn clinical_review(project_id: &str, confidence: i64) -> Review {
    Review::new(
        project_id,
        "Dr. Osei",
        "From a clinical perspective this helps doctors and nurses with patient diagnosis \
         and treatment. The impact on patient care is significant, implementation is \
         straightforward for clinics, and it is technically feasible with existing hospital \
         systems.",
        confidence,
    )
    .unwrap()
}

async fn wait_for_finish(pipeline: &ReviewPipeline, project_id: &str) -> ProcessingJob {
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Some(job) = pipeline.get_status(project_id).await.unwrap() {
            if !job.is_active() {
                return job;
            }
        }
    }
    panic!("processing did not finish in time");
}

#[tokio::test]
async fn gap_filling_generates_missing_core_perspectives() {
    let (pipeline, store) = build_pipeline(false, test_config());
    let project = seed_project(&store).await;
    let review = clinical_review(&project.project_id, 95);
    store.insert_review(&review).await.unwrap();

    let job = pipeline
        .process_project(&project.project_id, ProcessOptions::default())
        .await
        .unwrap();
    assert_eq!(job.status, ProcessingStatus::Pending);

    let finished = wait_for_finish(&pipeline, &project.project_id).await;
    assert_eq!(finished.status, ProcessingStatus::Completed);

    // Technical and business gaps were filled; clinical was covered.
    let reviews = store.reviews_for_project(&project.project_id).await.unwrap();
    let artificial: Vec<_> = reviews.iter().filter(|r| r.is_artificial).collect();
    assert_eq!(artificial.len(), 2);
    assert!(artificial.iter().all(|r| r.is_accepted()));
    assert!(artificial.iter().all(|r| r.reviewer_name.starts_with("AI ")));

    // No human review is ever flagged artificial.
    assert!(reviews
        .iter()
        .filter(|r| r.reviewer_name == "Dr. Osei")
        .all(|r| !r.is_artificial));

    let report = pipeline.get_feedback(&project.project_id).await.unwrap();
    assert_eq!(report.domain_insights.len(), 3);
    for score in report.feedback_scores.values() {
        assert!((1.0..=5.0).contains(score));
    }
    assert!((1.0..=5.0).contains(&report.overall_score));

    // Accepted reviews honor the configured floors.
    for review in reviews.iter().filter(|r| r.is_accepted()) {
        assert!(review.annotation.relevance_score.unwrap() >= 0.3);
        assert!(review.confidence_score >= 20);
    }
}

#[tokio::test]
async fn low_confidence_review_is_rejected_and_excluded() {
    let mut config = test_config();
    config.core_domains = None;
    let (pipeline, store) = build_pipeline(false, config);
    let project = seed_project(&store).await;
    let review = clinical_review(&project.project_id, 10);
    let review_id = review.review_id.clone();
    store.insert_review(&review).await.unwrap();

    let options = ProcessOptions {
        generate_artificial: false,
        force_reprocess: false,
    };
    pipeline.process_project(&project.project_id, options).await.unwrap();
    let finished = wait_for_finish(&pipeline, &project.project_id).await;
    assert_eq!(finished.status, ProcessingStatus::Completed);

    let reviews = store.reviews_for_project(&project.project_id).await.unwrap();
    let rejected = reviews.iter().find(|r| r.review_id == review_id).unwrap();
    assert!(!rejected.is_accepted());
    assert!(rejected
        .annotation
        .reject_reasons
        .contains(&RejectReason::LowConfidence));

    // Nothing accepted: every dimension is uncovered, none defaulted.
    let report = pipeline.get_feedback(&project.project_id).await.unwrap();
    assert!(report.feedback_scores.is_empty());
    assert_eq!(report.uncovered_dimensions.len(), 6);
    assert!(report.final_review.contains("No accepted review scored"));
}

#[tokio::test]
async fn reprocessing_without_force_is_idempotent() {
    let (pipeline, store) = build_pipeline(false, test_config());
    let project = seed_project(&store).await;
    store
        .insert_review(&clinical_review(&project.project_id, 95))
        .await
        .unwrap();

    let first = pipeline
        .process_project(&project.project_id, ProcessOptions::default())
        .await
        .unwrap();
    wait_for_finish(&pipeline, &project.project_id).await;
    let first_report = pipeline.get_feedback(&project.project_id).await.unwrap();

    let again = pipeline
        .process_project(&project.project_id, ProcessOptions::default())
        .await
        .unwrap();
    assert_eq!(again.job_id, first.job_id, "existing job is returned unchanged");

    let report_again = pipeline.get_feedback(&project.project_id).await.unwrap();
    assert_eq!(report_again.report_id, first_report.report_id);
}

#[tokio::test]
async fn force_reprocess_supersedes_the_report() {
    let (pipeline, store) = build_pipeline(false, test_config());
    let project = seed_project(&store).await;
    store
        .insert_review(&clinical_review(&project.project_id, 95))
        .await
        .unwrap();

    let first = pipeline
        .process_project(&project.project_id, ProcessOptions::default())
        .await
        .unwrap();
    wait_for_finish(&pipeline, &project.project_id).await;
    let first_report = pipeline.get_feedback(&project.project_id).await.unwrap();

    let forced = pipeline
        .process_project(
            &project.project_id,
            ProcessOptions {
                generate_artificial: true,
                force_reprocess: true,
            },
        )
        .await
        .unwrap();
    assert_ne!(forced.job_id, first.job_id);
    wait_for_finish(&pipeline, &project.project_id).await;

    let new_report = pipeline.get_feedback(&project.project_id).await.unwrap();
    assert_ne!(new_report.report_id, first_report.report_id, "old report superseded");
}

#[tokio::test]
async fn generation_timeouts_leave_domains_uncovered_not_defaulted() {
    let (pipeline, store) = build_pipeline(true, test_config());
    let project = seed_project(&store).await;
    store
        .insert_review(&clinical_review(&project.project_id, 95))
        .await
        .unwrap();

    pipeline
        .process_project(&project.project_id, ProcessOptions::default())
        .await
        .unwrap();
    let finished = wait_for_finish(&pipeline, &project.project_id).await;

    // Per-domain generation failure never fails the run.
    assert_eq!(finished.status, ProcessingStatus::Completed);
    assert!(finished.errors.iter().any(|e| e.contains("Generation failed")));

    let report = pipeline.get_feedback(&project.project_id).await.unwrap();
    // Only the clinical perspective exists.
    assert_eq!(report.domain_insights.len(), 1);
    assert_eq!(report.domain_insights[0].domain, "clinical");
    // Dimensions only the missing domains would have scored stay uncovered.
    assert!(report.uncovered_dimensions.contains(&"scalability".to_string()));
    assert!(report.uncovered_dimensions.contains(&"return_on_investment".to_string()));
    assert!(!report.feedback_scores.contains_key("scalability"));
    assert!(report.final_review.contains("Uncovered dimensions"));
}

#[tokio::test]
async fn feedback_before_processing_is_not_ready() {
    let (pipeline, store) = build_pipeline(false, test_config());
    let project = seed_project(&store).await;
    match pipeline.get_feedback(&project.project_id).await {
        Err(ReviewError::NotReady(id)) => assert_eq!(id, project.project_id),
        other => panic!("expected NotReady, got {:?}", other.map(|r| r.report_id)),
    }
}

#[tokio::test]
async fn artificial_reviews_survive_into_later_runs_as_coverage() {
    let (pipeline, store) = build_pipeline(false, test_config());
    let project = seed_project(&store).await;
    store
        .insert_review(&clinical_review(&project.project_id, 95))
        .await
        .unwrap();

    pipeline
        .process_project(&project.project_id, ProcessOptions::default())
        .await
        .unwrap();
    wait_for_finish(&pipeline, &project.project_id).await;
    let count_after_first = store
        .reviews_for_project(&project.project_id)
        .await
        .unwrap()
        .len();

    pipeline
        .process_project(
            &project.project_id,
            ProcessOptions {
                generate_artificial: true,
                force_reprocess: true,
            },
        )
        .await
        .unwrap();
    wait_for_finish(&pipeline, &project.project_id).await;

    // Previously generated reviews still cover their domains, so the forced
    // run generates nothing new.
    let count_after_second = store
        .reviews_for_project(&project.project_id)
        .await
        .unwrap()
        .len();
    assert_eq!(count_after_first, count_after_second);
}
