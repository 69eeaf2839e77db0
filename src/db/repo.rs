//! `ReviewStore` backed by PostgreSQL. Structured fields (annotations,
//! options, report payloads) are stored as serialized JSON text so the
//! schema stays stable while the engine evolves.

use crate::error::{ReviewError, Result};
use crate::models::{
    FeedbackReport, ProcessingJob, ProcessingStatus, Project, Review,
};
use crate::store::{BeginJobOutcome, ReviewStore};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables when they do not exist yet.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                project_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                processing_status TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE TABLE IF NOT EXISTS reviews (
                review_id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                submitted_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS reviews_project_idx ON reviews (project_id);
            CREATE TABLE IF NOT EXISTS processing_jobs (
                job_id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                status TEXT NOT NULL,
                payload TEXT NOT NULL,
                started_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS jobs_project_idx ON processing_jobs (project_id);
            CREATE TABLE IF NOT EXISTS feedback_reports (
                report_id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                generated_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS reports_project_idx ON feedback_reports (project_id);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn from_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn insert_project(&self, project: &Project) -> Result<()> {
        sqlx::query(
            "INSERT INTO projects (project_id, payload, processing_status, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (project_id) DO UPDATE
             SET payload = $2, processing_status = $3, updated_at = $4",
        )
        .bind(&project.project_id)
        .bind(to_json(project)?)
        .bind(project.processing_status.as_str())
        .bind(project.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT payload FROM projects WHERE project_id = $1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_json(r.get::<String, _>("payload").as_str()))
            .transpose()
    }

    async fn set_project_processing_status(
        &self,
        project_id: &str,
        status: ProcessingStatus,
    ) -> Result<()> {
        let mut project = self
            .get_project(project_id)
            .await?
            .ok_or_else(|| ReviewError::Store(format!("project '{}' not found", project_id)))?;
        project.processing_status = status;
        project.updated_at = chrono::Utc::now();
        self.insert_project(&project).await
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        sqlx::query(
            "INSERT INTO reviews (review_id, project_id, payload, submitted_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&review.review_id)
        .bind(&review.project_id)
        .bind(to_json(review)?)
        .bind(review.submitted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reviews_for_project(&self, project_id: &str) -> Result<Vec<Review>> {
        let rows = sqlx::query(
            "SELECT payload FROM reviews WHERE project_id = $1 ORDER BY submitted_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| from_json(r.get::<String, _>("payload").as_str()))
            .collect()
    }

    async fn update_review(&self, review: &Review) -> Result<()> {
        let result = sqlx::query("UPDATE reviews SET payload = $2 WHERE review_id = $1")
            .bind(&review.review_id)
            .bind(to_json(review)?)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ReviewError::Store(format!(
                "review '{}' not found",
                review.review_id
            )));
        }
        Ok(())
    }

    async fn try_begin_job(&self, job: ProcessingJob) -> Result<BeginJobOutcome> {
        // Transaction plus row lock makes the check-then-insert atomic
        // across concurrent triggers.
        let mut tx = self.pool.begin().await?;
        let active = sqlx::query(
            "SELECT payload FROM processing_jobs
             WHERE project_id = $1 AND status IN ('pending', 'processing')
             ORDER BY started_at DESC LIMIT 1
             FOR UPDATE",
        )
        .bind(&job.project_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = active {
            tx.rollback().await?;
            let existing: ProcessingJob = from_json(row.get::<String, _>("payload").as_str())?;
            return Ok(BeginJobOutcome::AlreadyActive(existing));
        }

        sqlx::query(
            "INSERT INTO processing_jobs (job_id, project_id, status, payload, started_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&job.job_id)
        .bind(&job.project_id)
        .bind(job.status.as_str())
        .bind(to_json(&job)?)
        .bind(job.started_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(BeginJobOutcome::Started(job))
    }

    async fn latest_job(&self, project_id: &str) -> Result<Option<ProcessingJob>> {
        let row = sqlx::query(
            "SELECT payload FROM processing_jobs
             WHERE project_id = $1 ORDER BY started_at DESC LIMIT 1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| from_json(r.get::<String, _>("payload").as_str()))
            .transpose()
    }

    async fn update_job(&self, job: &ProcessingJob) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT status FROM processing_jobs WHERE job_id = $1 FOR UPDATE")
            .bind(&job.job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ReviewError::Store(format!("job '{}' not found", job.job_id)))?;

        let current = match row.get::<String, _>("status").as_str() {
            "pending" => ProcessingStatus::Pending,
            "processing" => ProcessingStatus::Processing,
            "completed" => ProcessingStatus::Completed,
            _ => ProcessingStatus::Failed,
        };
        if current != job.status && !current.can_transition_to(job.status) {
            tx.rollback().await?;
            return Err(ReviewError::Store(format!(
                "illegal job transition {} -> {}",
                current.as_str(),
                job.status.as_str()
            )));
        }

        sqlx::query("UPDATE processing_jobs SET status = $2, payload = $3 WHERE job_id = $1")
            .bind(&job.job_id)
            .bind(job.status.as_str())
            .bind(to_json(job)?)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_report(&self, report: &FeedbackReport) -> Result<()> {
        sqlx::query(
            "INSERT INTO feedback_reports (report_id, project_id, payload, generated_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&report.report_id)
        .bind(&report.project_id)
        .bind(to_json(report)?)
        .bind(report.generated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_report(&self, project_id: &str) -> Result<Option<FeedbackReport>> {
        let row = sqlx::query(
            "SELECT payload FROM feedback_reports
             WHERE project_id = $1 ORDER BY generated_at DESC LIMIT 1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| from_json(r.get::<String, _>("payload").as_str()))
            .transpose()
    }
}
