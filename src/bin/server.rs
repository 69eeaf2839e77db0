//! HTTP server for the review engine API.
//! Simple HTTP server using tokio and basic HTTP handling.

use review_engine::config::{EngineConfig, LlmConfig};
use review_engine::db::{connect, PgStore};
use review_engine::llm::LlmClient;
use review_engine::models::{ProcessOptions, Project, Review};
use review_engine::ontology::{OntologySnapshot, OntologyStore};
use review_engine::pipeline::ReviewPipeline;
use review_engine::store::{MemoryStore, ReviewStore};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct AppState {
    pipeline: ReviewPipeline,
    store: Arc<dyn ReviewStore>,
    ontology: Arc<OntologyStore>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "review_engine=info".into()),
        )
        .init();

    println!("🚀 Starting Review Engine API Server...");

    let ontology = match std::env::var("ONTOLOGY_PATH") {
        Ok(path) => Arc::new(OntologyStore::from_file(std::path::Path::new(&path))?),
        Err(_) => Arc::new(OntologyStore::new(OntologySnapshot::builtin())),
    };

    let store: Arc<dyn ReviewStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pg = PgStore::new(connect(&url).await?);
            pg.init_schema().await?;
            println!("✅ Using PostgreSQL store");
            Arc::new(pg)
        }
        Err(_) => {
            println!("⚠️  DATABASE_URL not set - using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let llm = Arc::new(LlmClient::new(LlmConfig::from_env()));
    let pipeline = ReviewPipeline::new(
        Arc::clone(&store),
        Arc::clone(&ontology),
        llm,
        EngineConfig::default(),
    );
    let state = Arc::new(AppState {
        pipeline,
        store,
        ontology,
    });

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    println!("✅ Server listening on port {}", port);

    loop {
        let (stream, _addr) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            handle_connection(stream, state).await;
        });
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) {
    let request = match read_request(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Failed to read from stream: {}", e);
            return;
        }
    };

    let response = handle_request(&request, &state).await;
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        eprintln!("Failed to write response: {}", e);
    }
}

/// Read the request head, then as much body as Content-Length announces.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(header_end) = find_header_end(&buffer) {
            let head = String::from_utf8_lossy(&buffer[..header_end]);
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (key, value) = line.split_once(':')?;
                    if key.trim().eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + content_length {
                break;
            }
        }
        if buffer.len() > 1_048_576 {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buffer).to_string())
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}

fn body_of(request: &str) -> &str {
    request
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("")
}

async fn handle_request(request: &str, state: &AppState) -> String {
    let request_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return create_response(400, "Bad Request", "{}");
    }

    let method = parts[0];
    let path = parts[1].split('?').next().unwrap_or("/").trim_end_matches('/');
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.as_slice()) {
        ("GET", ["api", "health"]) => {
            create_response(200, "OK", r#"{"status":"ok","service":"review-engine-api"}"#)
        }
        ("GET", ["api", "v1", "ontology"]) => {
            let snapshot = state.ontology.snapshot();
            match serde_json::to_string(&*snapshot) {
                Ok(json) => create_response(200, "OK", &json),
                Err(_) => create_response(500, "Internal Server Error", r#"{"error":"serialization failed"}"#),
            }
        }
        ("POST", ["api", "v1", "ontology", "reload"]) => match state.ontology.reload() {
            Ok(()) => create_response(200, "OK", r#"{"reloaded":true}"#),
            Err(e) => error_response(500, &e.to_string()),
        },
        ("POST", ["api", "v1", "projects"]) => create_project(body_of(request), state).await,
        ("GET", ["api", "v1", "projects", id]) => get_project(id, state).await,
        ("POST", ["api", "v1", "projects", id, "reviews"]) => {
            submit_review(id, body_of(request), state).await
        }
        ("GET", ["api", "v1", "projects", id, "reviews"]) => list_reviews(id, state).await,
        ("POST", ["api", "v1", "projects", id, "process"]) => {
            start_processing(id, body_of(request), state).await
        }
        ("GET", ["api", "v1", "projects", id, "status"]) => get_status(id, state).await,
        ("GET", ["api", "v1", "projects", id, "feedback"]) => get_feedback(id, state).await,
        ("OPTIONS", _) => create_response(200, "OK", ""),
        _ => error_response(404, &format!("endpoint not found: {} {}", method, path)),
    }
}

async fn create_project(body: &str, state: &AppState) -> String {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return error_response(400, "invalid JSON body");
    };
    let (Some(name), Some(description), Some(work_done)) = (
        json.get("name").and_then(|v| v.as_str()),
        json.get("description").and_then(|v| v.as_str()),
        json.get("work_done").and_then(|v| v.as_str()),
    ) else {
        return error_response(400, "name, description and work_done are required");
    };

    let project = Project::new(name, description, work_done);
    match state.store.insert_project(&project).await {
        Ok(()) => match serde_json::to_string(&project) {
            Ok(json) => create_response(201, "Created", &json),
            Err(e) => error_response(500, &e.to_string()),
        },
        Err(e) => error_response(500, &e.to_string()),
    }
}

async fn get_project(project_id: &str, state: &AppState) -> String {
    match state.store.get_project(project_id).await {
        Ok(Some(project)) => match serde_json::to_string(&project) {
            Ok(json) => create_response(200, "OK", &json),
            Err(e) => error_response(500, &e.to_string()),
        },
        Ok(None) => error_response(404, "project not found"),
        Err(e) => error_response(500, &e.to_string()),
    }
}

async fn submit_review(project_id: &str, body: &str, state: &AppState) -> String {
    match state.store.get_project(project_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(404, "project not found"),
        Err(e) => return error_response(500, &e.to_string()),
    }
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return error_response(400, "invalid JSON body");
    };
    let (Some(reviewer_name), Some(text_review), Some(confidence_score)) = (
        json.get("reviewer_name").and_then(|v| v.as_str()),
        json.get("text_review").and_then(|v| v.as_str()),
        json.get("confidence_score").and_then(|v| v.as_i64()),
    ) else {
        return error_response(400, "reviewer_name, text_review and confidence_score are required");
    };

    let mut review = match Review::new(project_id, reviewer_name, text_review, confidence_score) {
        Ok(review) => review,
        Err(e) => return error_response(422, &e.to_string()),
    };
    if let Some(links) = json.get("links").and_then(|v| v.as_object()) {
        for (kind, url) in links {
            if let Some(url) = url.as_str() {
                review.links.insert(kind.clone(), url.to_string());
            }
        }
    }

    match state.store.insert_review(&review).await {
        Ok(()) => match serde_json::to_string(&review) {
            Ok(json) => create_response(201, "Created", &json),
            Err(e) => error_response(500, &e.to_string()),
        },
        Err(e) => error_response(500, &e.to_string()),
    }
}

async fn list_reviews(project_id: &str, state: &AppState) -> String {
    match state.store.reviews_for_project(project_id).await {
        Ok(reviews) => {
            let accepted = reviews.iter().filter(|r| r.is_accepted()).count();
            let artificial = reviews.iter().filter(|r| r.is_artificial).count();
            let payload = serde_json::json!({
                "reviews": reviews,
                "total_count": reviews.len(),
                "accepted_count": accepted,
                "artificial_count": artificial,
            });
            create_response(200, "OK", &payload.to_string())
        }
        Err(e) => error_response(500, &e.to_string()),
    }
}

async fn start_processing(project_id: &str, body: &str, state: &AppState) -> String {
    let json = serde_json::from_str::<serde_json::Value>(body).unwrap_or_default();
    let options = ProcessOptions {
        generate_artificial: json
            .get("generate_artificial")
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
        force_reprocess: json
            .get("force_reprocess")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    };

    match state.pipeline.process_project(project_id, options).await {
        Ok(job) => match serde_json::to_string(&job) {
            Ok(json) => create_response(202, "Accepted", &json),
            Err(e) => error_response(500, &e.to_string()),
        },
        Err(e) => error_response(422, &e.to_string()),
    }
}

async fn get_status(project_id: &str, state: &AppState) -> String {
    match state.pipeline.get_status(project_id).await {
        Ok(Some(job)) => match serde_json::to_string(&job) {
            Ok(json) => create_response(200, "OK", &json),
            Err(e) => error_response(500, &e.to_string()),
        },
        Ok(None) => error_response(404, "no processing job for this project"),
        Err(e) => error_response(500, &e.to_string()),
    }
}

async fn get_feedback(project_id: &str, state: &AppState) -> String {
    match state.pipeline.get_feedback(project_id).await {
        Ok(report) => match serde_json::to_string(&report) {
            Ok(json) => create_response(200, "OK", &json),
            Err(e) => error_response(500, &e.to_string()),
        },
        Err(review_engine::error::ReviewError::NotReady(_)) => {
            error_response(404, "no feedback report available; process the project first")
        }
        Err(e) => error_response(500, &e.to_string()),
    }
}

fn error_response(status: u16, message: &str) -> String {
    let text = match status {
        400 => "Bad Request",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        _ => "Internal Server Error",
    };
    let body = serde_json::json!({ "error": message });
    create_response(status, text, &body.to_string())
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, PUT, DELETE, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}
