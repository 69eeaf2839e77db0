use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Classification confidence {score:.3} below floor {floor:.3}")]
    ClassificationLowConfidence { score: f64, floor: f64 },

    #[error("Generation failed for domain '{domain}': {cause}")]
    GenerationFailed { domain: String, cause: String },

    #[error("Ontology unavailable: {0}")]
    OntologyUnavailable(String),

    #[error("No accepted reviews to aggregate")]
    AggregationEmpty,

    #[error("No completed feedback report for project '{0}'")]
    NotReady(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM call timed out after {0}s")]
    LlmTimeout(u64),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, ReviewError>;
