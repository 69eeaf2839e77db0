//! Core records: projects, reviews, processing jobs, and feedback reports.

use crate::error::{ReviewError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub(crate) fn short_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &hex[..8])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Transitions are monotonic: pending -> processing -> completed|failed.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub description: String,
    pub work_done: String,
    pub status: ProjectStatus,
    pub processing_status: ProcessingStatus,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: &str, description: &str, work_done: &str) -> Self {
        let now = Utc::now();
        Self {
            project_id: short_id("proj"),
            name: name.to_string(),
            description: description.to_string(),
            work_done: work_done.to_string(),
            status: ProjectStatus::Active,
            processing_status: ProcessingStatus::Pending,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Combined text used for classification and prompt construction.
    pub fn full_description(&self) -> String {
        format!("{}\n{}\n{}", self.name, self.description, self.work_done)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    LowRelevance,
    LowConfidence,
    Unclassifiable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Submitted,
    Accepted,
    Rejected,
}

/// Processing annotation written exactly once per run; re-processing
/// recomputes and overwrites the whole struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewAnnotation {
    pub domain: Option<String>,
    pub expertise_level: Option<String>,
    pub relevance_score: Option<f64>,
    pub sentiment_scores: HashMap<String, f64>,
    pub reject_reasons: Vec<RejectReason>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub review_id: String,
    pub project_id: String,
    pub reviewer_name: String,
    pub text_review: String,
    pub confidence_score: u8,
    #[serde(default)]
    pub links: HashMap<String, String>,
    pub status: ReviewStatus,
    pub is_artificial: bool,
    #[serde(default)]
    pub annotation: ReviewAnnotation,
    pub submitted_at: DateTime<Utc>,
}

impl Review {
    /// Validates the confidence score at submission time; out-of-range
    /// scores never enter the pipeline.
    pub fn new(
        project_id: &str,
        reviewer_name: &str,
        text_review: &str,
        confidence_score: i64,
    ) -> Result<Self> {
        if !(0..=100).contains(&confidence_score) {
            return Err(ReviewError::Validation(format!(
                "confidence score {} outside 0-100",
                confidence_score
            )));
        }
        if text_review.trim().is_empty() {
            return Err(ReviewError::Validation("review text is empty".to_string()));
        }
        Ok(Self {
            review_id: short_id("rev"),
            project_id: project_id.to_string(),
            reviewer_name: reviewer_name.to_string(),
            text_review: text_review.to_string(),
            confidence_score: confidence_score as u8,
            links: HashMap::new(),
            status: ReviewStatus::Submitted,
            is_artificial: false,
            annotation: ReviewAnnotation::default(),
            submitted_at: Utc::now(),
        })
    }

    pub fn is_accepted(&self) -> bool {
        self.status == ReviewStatus::Accepted
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProcessOptions {
    pub generate_artificial: bool,
    pub force_reprocess: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            generate_artificial: true,
            force_reprocess: false,
        }
    }
}

/// Ordered pipeline steps, recorded on the job as they complete.
pub const PROCESSING_STEPS: [&str; 6] = [
    "loading_project",
    "classifying_reviews",
    "detecting_gaps",
    "generating_artificial_reviews",
    "aggregating_scores",
    "synthesizing_feedback",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub job_id: String,
    pub project_id: String,
    pub status: ProcessingStatus,
    pub current_step: String,
    pub steps_completed: Vec<String>,
    pub options: ProcessOptions,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessingJob {
    pub fn new(project_id: &str, options: ProcessOptions) -> Self {
        Self {
            job_id: short_id("job"),
            project_id: project_id.to_string(),
            status: ProcessingStatus::Pending,
            current_step: "starting".to_string(),
            steps_completed: Vec::new(),
            options,
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, ProcessingStatus::Pending | ProcessingStatus::Processing)
    }

    pub fn mark_step(&mut self, step: &str) {
        self.current_step = step.to_string();
        if !self.steps_completed.iter().any(|s| s == step) {
            self.steps_completed.push(step.to_string());
        }
    }
}

/// Per-domain slice of the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainInsight {
    pub domain: String,
    pub domain_name: String,
    pub review_count: usize,
    pub synthetic_count: usize,
    pub key_strengths: Vec<String>,
    pub concerns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub report_id: String,
    pub project_id: String,
    /// Weighted per-dimension scores; dimensions nobody scored are absent.
    pub feedback_scores: HashMap<String, f64>,
    /// Dimensions absent from `feedback_scores`, stated explicitly.
    pub uncovered_dimensions: Vec<String>,
    pub overall_score: f64,
    pub final_review: String,
    pub domain_insights: Vec<DomainInsight>,
    pub recommendations: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub generated_at: DateTime<Utc>,
}

impl FeedbackReport {
    pub fn new(project_id: &str) -> Self {
        Self {
            report_id: short_id("rep"),
            project_id: project_id.to_string(),
            feedback_scores: HashMap::new(),
            uncovered_dimensions: Vec::new(),
            overall_score: 0.0,
            final_review: String::new(),
            domain_insights: Vec::new(),
            recommendations: Vec::new(),
            metadata: HashMap::new(),
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_rejects_out_of_range_confidence() {
        assert!(Review::new("proj_1", "Ada", "solid work", 101).is_err());
        assert!(Review::new("proj_1", "Ada", "solid work", -1).is_err());
        assert!(Review::new("proj_1", "Ada", "solid work", 100).is_ok());
        assert!(Review::new("proj_1", "Ada", "solid work", 0).is_ok());
    }

    #[test]
    fn review_rejects_empty_text() {
        assert!(Review::new("proj_1", "Ada", "   ", 50).is_err());
    }

    #[test]
    fn status_transitions_are_monotonic() {
        use ProcessingStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
    }

    #[test]
    fn job_records_steps_once() {
        let mut job = ProcessingJob::new("proj_1", ProcessOptions::default());
        job.mark_step("classifying_reviews");
        job.mark_step("classifying_reviews");
        assert_eq!(job.steps_completed.len(), 1);
        assert_eq!(job.current_step, "classifying_reviews");
    }
}
