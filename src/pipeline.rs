//! Processing pipeline: classify -> profile -> filter -> detect gaps ->
//! generate -> aggregate -> synthesize, run as a background task per
//! project with an atomic one-active-job guard.

use crate::aggregator::ScoreAggregator;
use crate::classifier::DomainClassifier;
use crate::config::EngineConfig;
use crate::coverage;
use crate::error::{ReviewError, Result};
use crate::filter::{AcceptanceFilter, Decision};
use crate::generator::SyntheticReviewGenerator;
use crate::llm::TextGenerator;
use crate::models::{
    ProcessOptions, ProcessingJob, ProcessingStatus, Project, Review, ReviewStatus,
};
use crate::ontology::{OntologySnapshot, OntologyStore};
use crate::profiler::ReviewerProfiler;
use crate::sentiment::SentimentScorer;
use crate::store::{BeginJobOutcome, ReviewStore};
use crate::synthesizer::FeedbackSynthesizer;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct ReviewPipeline {
    store: Arc<dyn ReviewStore>,
    ontology: Arc<OntologyStore>,
    generator: Arc<dyn TextGenerator>,
    config: EngineConfig,
}

impl ReviewPipeline {
    pub fn new(
        store: Arc<dyn ReviewStore>,
        ontology: Arc<OntologyStore>,
        generator: Arc<dyn TextGenerator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            ontology,
            generator,
            config,
        }
    }

    /// Start (or return the existing) processing job for a project. Returns
    /// immediately; the run itself happens on a spawned task and is polled
    /// via `get_status`.
    pub async fn process_project(
        &self,
        project_id: &str,
        options: ProcessOptions,
    ) -> Result<ProcessingJob> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| ReviewError::Validation(format!("project '{}' not found", project_id)))?;

        // Completed run + existing report: idempotent unless forced.
        if !options.force_reprocess {
            if let Some(job) = self.store.latest_job(project_id).await? {
                if job.status == ProcessingStatus::Completed
                    && self.store.latest_report(project_id).await?.is_some()
                {
                    info!("Project {} already processed; returning existing job", project_id);
                    return Ok(job);
                }
            }
        }

        // At most one in-flight run per project, force or not.
        let job = ProcessingJob::new(project_id, options);
        let job = match self.store.try_begin_job(job).await? {
            BeginJobOutcome::AlreadyActive(existing) => {
                info!("Project {} already has an active job {}", project_id, existing.job_id);
                return Ok(existing);
            }
            BeginJobOutcome::Started(job) => job,
        };

        let pipeline = self.clone();
        let spawned_job = job.clone();
        tokio::spawn(async move {
            pipeline.run(project, spawned_job).await;
        });

        Ok(job)
    }

    /// Latest job for the project, if any.
    pub async fn get_status(&self, project_id: &str) -> Result<Option<ProcessingJob>> {
        self.store.latest_job(project_id).await
    }

    /// The current report; fails with `NotReady` before a completed run.
    pub async fn get_feedback(&self, project_id: &str) -> Result<crate::models::FeedbackReport> {
        self.store
            .latest_report(project_id)
            .await?
            .ok_or_else(|| ReviewError::NotReady(project_id.to_string()))
    }

    async fn run(&self, project: Project, mut job: ProcessingJob) {
        let project_id = project.project_id.clone();
        job.status = ProcessingStatus::Processing;
        if let Err(e) = self.store.update_job(&job).await {
            error!("Cannot mark job {} processing: {}", job.job_id, e);
            return;
        }
        let _ = self
            .store
            .set_project_processing_status(&project_id, ProcessingStatus::Processing)
            .await;

        match self.run_steps(&project, &mut job).await {
            Ok(()) => {
                job.status = ProcessingStatus::Completed;
                job.completed_at = Some(Utc::now());
                if let Err(e) = self.store.update_job(&job).await {
                    error!("Cannot mark job {} completed: {}", job.job_id, e);
                }
                let _ = self
                    .store
                    .set_project_processing_status(&project_id, ProcessingStatus::Completed)
                    .await;
                info!("Project {} processing completed", project_id);
            }
            Err(e) => {
                error!("Project {} processing failed: {}", project_id, e);
                job.errors.push(format!("fatal: {}", e));
                job.status = ProcessingStatus::Failed;
                job.completed_at = Some(Utc::now());
                if let Err(e) = self.store.update_job(&job).await {
                    error!("Cannot mark job {} failed: {}", job.job_id, e);
                }
                let _ = self
                    .store
                    .set_project_processing_status(&project_id, ProcessingStatus::Failed)
                    .await;
            }
        }
    }

    /// The six pipeline steps. Per-review and per-domain failures are
    /// collected into the job's error list; only store/ontology failures
    /// propagate and fail the run.
    async fn run_steps(&self, project: &Project, job: &mut ProcessingJob) -> Result<()> {
        job.mark_step("loading_project");
        self.store.update_job(job).await?;

        // One immutable ontology view for the whole run.
        let snapshot = self.ontology.snapshot();
        let force = job.options.force_reprocess;

        job.mark_step("classifying_reviews");
        self.store.update_job(job).await?;
        self.annotate_reviews(project, &snapshot, force, job).await?;

        job.mark_step("detecting_gaps");
        self.store.update_job(job).await?;
        let reviews = self.store.reviews_for_project(&project.project_id).await?;
        let accepted: Vec<&Review> = reviews.iter().filter(|r| r.is_accepted()).collect();
        let core = coverage::core_domains(&self.config, &snapshot);
        let gaps = coverage::gaps(&accepted, &core);
        info!(
            "Project {}: {} accepted review(s), {} coverage gap(s)",
            project.project_id,
            accepted.len(),
            gaps.len()
        );

        if job.options.generate_artificial && !gaps.is_empty() {
            job.mark_step("generating_artificial_reviews");
            self.store.update_job(job).await?;
            self.fill_gaps(project, &gaps, &snapshot, job).await?;
        }

        job.mark_step("aggregating_scores");
        self.store.update_job(job).await?;
        let reviews = self.store.reviews_for_project(&project.project_id).await?;
        let accepted: Vec<&Review> = reviews.iter().filter(|r| r.is_accepted()).collect();
        let aggregated = ScoreAggregator::new(&self.config).aggregate(&accepted, &snapshot);
        if aggregated.is_empty() {
            warn!("Project {}: {}", project.project_id, ReviewError::AggregationEmpty);
            job.errors.push(ReviewError::AggregationEmpty.to_string());
        }

        job.mark_step("synthesizing_feedback");
        self.store.update_job(job).await?;
        let mut report = FeedbackSynthesizer::new(&self.config)
            .synthesize(project, &accepted, &aggregated, &snapshot);
        report.metadata.insert("total_reviews".to_string(), reviews.len().into());
        report.metadata.insert(
            "processing_time_seconds".to_string(),
            (Utc::now() - job.started_at).num_seconds().into(),
        );
        self.store.save_report(&report).await?;
        Ok(())
    }

    /// Classify, profile, filter, and sentiment-score every pending review
    /// concurrently; reviews are independent pure-function inputs.
    async fn annotate_reviews(
        &self,
        project: &Project,
        snapshot: &Arc<OntologySnapshot>,
        force: bool,
        job: &mut ProcessingJob,
    ) -> Result<()> {
        let reviews = self.store.reviews_for_project(&project.project_id).await?;

        let mut tasks: JoinSet<(String, Result<Review>)> = JoinSet::new();
        for review in reviews {
            if review.annotation.processed_at.is_some() && !force {
                continue;
            }
            let snapshot = Arc::clone(snapshot);
            let config = self.config.clone();
            let scorer = SentimentScorer::new(Arc::clone(&self.generator), &self.config);
            tasks.spawn(async move {
                let id = review.review_id.clone();
                let annotated = annotate_one(review, &snapshot, &config, &scorer).await;
                (id, annotated)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(review))) => {
                    self.store.update_review(&review).await?;
                }
                Ok((review_id, Err(e))) => {
                    warn!("Review {} failed processing: {}", review_id, e);
                    job.errors.push(format!("review {}: {}", review_id, e));
                }
                Err(e) => {
                    job.errors.push(format!("review task panicked: {}", e));
                }
            }
        }
        Ok(())
    }

    /// Generate reviews for missing domains, concurrently but bounded.
    /// Failed or skipped domains simply stay uncovered.
    async fn fill_gaps(
        &self,
        project: &Project,
        gaps: &BTreeSet<String>,
        snapshot: &Arc<OntologySnapshot>,
        job: &mut ProcessingJob,
    ) -> Result<()> {
        let classifier = DomainClassifier::new(self.config.min_similarity);
        let semaphore = Arc::new(Semaphore::new(self.config.generation_concurrency.max(1)));
        let mut tasks: JoinSet<(String, Result<Review>)> = JoinSet::new();

        for domain_id in gaps {
            // Only generate perspectives the project is at least minimally
            // relevant to; the rest stay gaps and are reported uncovered.
            let relevance = snapshot
                .domain(domain_id)
                .map(|d| classifier.domain_relevance(&project.full_description(), d))
                .unwrap_or(0.0);
            if relevance < self.config.generation_relevance_floor {
                info!(
                    "Skipping generation for domain {} (project relevance {:.2})",
                    domain_id, relevance
                );
                continue;
            }

            let domain_id = domain_id.clone();
            let project = project.clone();
            let snapshot = Arc::clone(snapshot);
            let config = self.config.clone();
            let generator = SyntheticReviewGenerator::new(Arc::clone(&self.generator), &self.config);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await;
                let result = async {
                    let mut synthetic = generator.generate(&project, &domain_id, &snapshot).await?;
                    // Synthetic reviews go through the same classification
                    // and filtering as human ones; off-topic output can
                    // still be rejected here.
                    annotate_synthetic(&mut synthetic, &snapshot, &config);
                    Ok(synthetic)
                }
                .await;
                (domain_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((domain_id, Ok(synthetic))) => {
                    if synthetic.is_accepted() {
                        if synthetic.annotation.domain.as_deref() == Some(domain_id.as_str()) {
                            info!("Generated review closed gap for domain {}", domain_id);
                        } else {
                            warn!(
                                "Generated review for {} classified as {:?}; gap remains",
                                domain_id, synthetic.annotation.domain
                            );
                        }
                    } else {
                        warn!("Generated review for {} was rejected by the filter", domain_id);
                    }
                    self.store.insert_review(&synthetic).await?;
                }
                Ok((domain_id, Err(e))) => {
                    warn!("{}", e);
                    job.errors.push(format!("domain {}: {}", domain_id, e));
                }
                Err(e) => {
                    job.errors.push(format!("generation task panicked: {}", e));
                }
            }
        }
        Ok(())
    }
}

/// Full annotation of one human (or re-processed) review. Classification
/// below the similarity floor downgrades to a rejection rather than
/// failing the run.
async fn annotate_one(
    mut review: Review,
    snapshot: &OntologySnapshot,
    config: &EngineConfig,
    scorer: &SentimentScorer,
) -> Result<Review> {
    let classifier = DomainClassifier::new(config.min_similarity);
    let filter = AcceptanceFilter::new(config);

    let matched = match classifier.classify(&review.text_review, snapshot) {
        Ok(matched) => matched,
        Err(ReviewError::ClassificationLowConfidence { score, floor }) => {
            info!(
                "Review {} unclassifiable (similarity {:.3} < {:.3})",
                review.review_id, score, floor
            );
            review.annotation = Default::default();
            review.annotation.reject_reasons = vec![crate::models::RejectReason::Unclassifiable];
            review.annotation.processed_at = Some(Utc::now());
            review.status = ReviewStatus::Rejected;
            return Ok(review);
        }
        Err(e) => return Err(e),
    };

    let profile = ReviewerProfiler::profile(
        &review.text_review,
        review.confidence_score,
        &matched.domain_id,
        snapshot,
    );

    review.annotation.domain = Some(matched.domain_id.clone());
    review.annotation.expertise_level = Some(profile.expertise_level);
    review.annotation.relevance_score = Some(profile.relevance_score);

    match filter.decide(profile.relevance_score, review.confidence_score) {
        Decision::Accepted => {
            review.status = ReviewStatus::Accepted;
            review.annotation.reject_reasons = Vec::new();
            // Synthetic reviews carry scores parsed at generation time.
            if review.annotation.sentiment_scores.is_empty() {
                let (scores, warning) = scorer
                    .score(&review.text_review, &matched.domain_id, snapshot)
                    .await;
                if let Some(warning) = warning {
                    warn!("Review {}: {}", review.review_id, warning);
                }
                review.annotation.sentiment_scores = scores;
            }
        }
        Decision::Rejected(reasons) => {
            review.status = ReviewStatus::Rejected;
            review.annotation.reject_reasons = reasons;
        }
    }
    review.annotation.processed_at = Some(Utc::now());
    Ok(review)
}

/// Synchronous annotation path for freshly generated reviews: classify,
/// profile, filter. Their dimension scores were parsed from the generation
/// reply, so no scoring call is needed.
fn annotate_synthetic(review: &mut Review, snapshot: &OntologySnapshot, config: &EngineConfig) {
    let classifier = DomainClassifier::new(config.min_similarity);
    let filter = AcceptanceFilter::new(config);

    match classifier.classify(&review.text_review, snapshot) {
        Ok(matched) => {
            let profile = ReviewerProfiler::profile(
                &review.text_review,
                review.confidence_score,
                &matched.domain_id,
                snapshot,
            );
            review.annotation.domain = Some(matched.domain_id);
            review.annotation.expertise_level = Some(profile.expertise_level);
            review.annotation.relevance_score = Some(profile.relevance_score);
            match filter.decide(profile.relevance_score, review.confidence_score) {
                Decision::Accepted => review.status = ReviewStatus::Accepted,
                Decision::Rejected(reasons) => {
                    review.status = ReviewStatus::Rejected;
                    review.annotation.reject_reasons = reasons;
                }
            }
        }
        Err(_) => {
            review.status = ReviewStatus::Rejected;
            review.annotation.reject_reasons = vec![crate::models::RejectReason::Unclassifiable];
        }
    }
    review.annotation.processed_at = Some(Utc::now());
}
