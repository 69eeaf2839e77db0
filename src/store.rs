//! Persistence seam. The pipeline only sees the `ReviewStore` trait;
//! `MemoryStore` backs tests and the CLI, the `db` module provides the
//! PostgreSQL implementation.

use crate::error::{ReviewError, Result};
use crate::models::{
    FeedbackReport, ProcessingJob, ProcessingStatus, Project, Review,
};
use async_trait::async_trait;
use dashmap::DashMap;

/// Outcome of attempting to start a processing job. Exactly one active job
/// may exist per project; a second trigger gets the existing one back.
#[derive(Debug, Clone)]
pub enum BeginJobOutcome {
    Started(ProcessingJob),
    AlreadyActive(ProcessingJob),
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn insert_project(&self, project: &Project) -> Result<()>;
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>>;
    async fn set_project_processing_status(
        &self,
        project_id: &str,
        status: ProcessingStatus,
    ) -> Result<()>;

    async fn insert_review(&self, review: &Review) -> Result<()>;
    async fn reviews_for_project(&self, project_id: &str) -> Result<Vec<Review>>;
    /// Overwrite a review's mutable processing state (status + annotation).
    async fn update_review(&self, review: &Review) -> Result<()>;

    /// Atomically begin a job unless one is already active for the project.
    async fn try_begin_job(&self, job: ProcessingJob) -> Result<BeginJobOutcome>;
    async fn latest_job(&self, project_id: &str) -> Result<Option<ProcessingJob>>;
    /// Persist job progress. Status changes must follow the monotonic
    /// pending -> processing -> completed|failed order.
    async fn update_job(&self, job: &ProcessingJob) -> Result<()>;

    /// Store a new report; earlier reports for the project are superseded.
    async fn save_report(&self, report: &FeedbackReport) -> Result<()>;
    async fn latest_report(&self, project_id: &str) -> Result<Option<FeedbackReport>>;
}

/// Concurrent in-memory store keyed by project.
#[derive(Default)]
pub struct MemoryStore {
    projects: DashMap<String, Project>,
    reviews: DashMap<String, Vec<Review>>,
    jobs: DashMap<String, Vec<ProcessingJob>>,
    reports: DashMap<String, Vec<FeedbackReport>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn insert_project(&self, project: &Project) -> Result<()> {
        self.projects.insert(project.project_id.clone(), project.clone());
        Ok(())
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        Ok(self.projects.get(project_id).map(|p| p.value().clone()))
    }

    async fn set_project_processing_status(
        &self,
        project_id: &str,
        status: ProcessingStatus,
    ) -> Result<()> {
        let mut project = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| ReviewError::Store(format!("project '{}' not found", project_id)))?;
        project.processing_status = status;
        project.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        self.reviews
            .entry(review.project_id.clone())
            .or_default()
            .push(review.clone());
        Ok(())
    }

    async fn reviews_for_project(&self, project_id: &str) -> Result<Vec<Review>> {
        Ok(self
            .reviews
            .get(project_id)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn update_review(&self, review: &Review) -> Result<()> {
        let mut reviews = self
            .reviews
            .get_mut(&review.project_id)
            .ok_or_else(|| ReviewError::Store(format!("no reviews for '{}'", review.project_id)))?;
        let slot = reviews
            .iter_mut()
            .find(|r| r.review_id == review.review_id)
            .ok_or_else(|| ReviewError::Store(format!("review '{}' not found", review.review_id)))?;
        *slot = review.clone();
        Ok(())
    }

    async fn try_begin_job(&self, job: ProcessingJob) -> Result<BeginJobOutcome> {
        // The entry guard makes the check-then-insert atomic per project.
        let mut jobs = self.jobs.entry(job.project_id.clone()).or_default();
        if let Some(active) = jobs.iter().find(|j| j.is_active()) {
            return Ok(BeginJobOutcome::AlreadyActive(active.clone()));
        }
        jobs.push(job.clone());
        Ok(BeginJobOutcome::Started(job))
    }

    async fn latest_job(&self, project_id: &str) -> Result<Option<ProcessingJob>> {
        Ok(self
            .jobs
            .get(project_id)
            .and_then(|jobs| jobs.last().cloned()))
    }

    async fn update_job(&self, job: &ProcessingJob) -> Result<()> {
        let mut jobs = self
            .jobs
            .get_mut(&job.project_id)
            .ok_or_else(|| ReviewError::Store(format!("no jobs for '{}'", job.project_id)))?;
        let slot = jobs
            .iter_mut()
            .find(|j| j.job_id == job.job_id)
            .ok_or_else(|| ReviewError::Store(format!("job '{}' not found", job.job_id)))?;
        if slot.status != job.status && !slot.status.can_transition_to(job.status) {
            return Err(ReviewError::Store(format!(
                "illegal job transition {} -> {}",
                slot.status.as_str(),
                job.status.as_str()
            )));
        }
        *slot = job.clone();
        Ok(())
    }

    async fn save_report(&self, report: &FeedbackReport) -> Result<()> {
        self.reports
            .entry(report.project_id.clone())
            .or_default()
            .push(report.clone());
        Ok(())
    }

    async fn latest_report(&self, project_id: &str) -> Result<Option<FeedbackReport>> {
        Ok(self
            .reports
            .get(project_id)
            .and_then(|reports| reports.last().cloned()))
    }
}
