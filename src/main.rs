use anyhow::{bail, Result};
use clap::Parser;
use review_engine::config::{EngineConfig, LlmConfig};
use review_engine::llm::LlmClient;
use review_engine::models::{ProcessOptions, ProcessingStatus, Project, Review};
use review_engine::ontology::{OntologySnapshot, OntologyStore};
use review_engine::pipeline::ReviewPipeline;
use review_engine::store::{MemoryStore, ReviewStore};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "review-engine")]
#[command(about = "Ontology-driven multi-perspective review engine for hackathon projects")]
struct Args {
    /// JSON file with the project and its reviews
    input: PathBuf,

    /// Path to an ontology JSON file (default: builtin ontology)
    #[arg(short, long)]
    ontology: Option<PathBuf>,

    /// Skip generating artificial reviews for uncovered domains
    #[arg(long)]
    no_artificial: bool,

    /// LLM API key (or set LLM_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct InputFile {
    project: InputProject,
    reviews: Vec<InputReview>,
}

#[derive(Deserialize)]
struct InputProject {
    name: String,
    description: String,
    work_done: String,
}

#[derive(Deserialize)]
struct InputReview {
    reviewer_name: String,
    text_review: String,
    confidence_score: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "review_engine=info".into()),
        )
        .init();

    let args = Args::parse();

    let ontology = match &args.ontology {
        Some(path) => OntologyStore::from_file(path)?,
        None => OntologyStore::new(OntologySnapshot::builtin()),
    };

    let mut llm_config = LlmConfig::from_env();
    if let Some(key) = args.api_key {
        llm_config.api_key = key;
    }

    let store = Arc::new(MemoryStore::new());
    let pipeline = ReviewPipeline::new(
        store.clone(),
        Arc::new(ontology),
        Arc::new(LlmClient::new(llm_config)),
        EngineConfig::default(),
    );

    // Load the project and its reviews.
    let input: InputFile = serde_json::from_str(&std::fs::read_to_string(&args.input)?)?;
    let project = Project::new(&input.project.name, &input.project.description, &input.project.work_done);
    let project_id = project.project_id.clone();
    store.insert_project(&project).await?;
    for r in &input.reviews {
        let review = Review::new(&project_id, &r.reviewer_name, &r.text_review, r.confidence_score)?;
        store.insert_review(&review).await?;
    }
    info!("Loaded project '{}' with {} review(s)", input.project.name, input.reviews.len());

    let options = ProcessOptions {
        generate_artificial: !args.no_artificial,
        force_reprocess: false,
    };
    let job = pipeline.process_project(&project_id, options).await?;
    info!("Processing started (job {})", job.job_id);

    // Poll until the background run finishes.
    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        match pipeline.get_status(&project_id).await? {
            Some(job) if job.status == ProcessingStatus::Completed => {
                if !job.errors.is_empty() {
                    for e in &job.errors {
                        eprintln!("warning: {}", e);
                    }
                }
                break;
            }
            Some(job) if job.status == ProcessingStatus::Failed => {
                bail!("processing failed: {}", job.errors.join("; "));
            }
            _ => {}
        }
    }

    let report = pipeline.get_feedback(&project_id).await?;
    println!("{}", report.final_review);
    println!("\n## Dimension Scores\n");
    println!("| Dimension | Score (1-5) |");
    println!("|-----------|-------------|");
    let mut scores: Vec<_> = report.feedback_scores.iter().collect();
    scores.sort_by(|a, b| a.0.cmp(b.0));
    for (dimension, score) in scores {
        println!("| {} | {:.1} |", dimension, score);
    }
    for dimension in &report.uncovered_dimensions {
        println!("| {} | uncovered |", dimension);
    }
    println!("\nOverall score: {:.1}", report.overall_score);

    Ok(())
}
