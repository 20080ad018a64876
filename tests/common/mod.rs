//! Shared fixtures: a local axum server standing in for the generation
//! backend, and temp-dir config files.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const HAPPY: &[&str] = &[
    r#"{"status":"started","message":"Starting generation process..."}"#,
    r#"{"status":"explanation_sent","message":"Sending explanation request..."}"#,
    r#"{"status":"explanation","message":"Analyzing repository structure..."}"#,
    r#"{"status":"explanation_chunk","chunk":"A"}"#,
    r#"{"status":"explanation_chunk","chunk":"B"}"#,
    r#"{"status":"mapping_sent","message":"Creating component mapping..."}"#,
    r#"{"status":"mapping","message":"Creating component mapping..."}"#,
    r#"{"status":"mapping_chunk","chunk":"M"}"#,
    r#"{"status":"diagram_sent","message":"Generating diagram..."}"#,
    r#"{"status":"diagram","message":"Generating diagram..."}"#,
    r#"{"status":"diagram_chunk","chunk":"graph TD\n"}"#,
    r#"{"status":"diagram_chunk","chunk":"  A-->B"}"#,
    r#"{"status":"complete","explanation":"AB","mapping":"M","diagram":"graph TD\n  A-->B"}"#,
];

// ─── Fake backend ───────────────────────────────────────────────────

/// Scripted generation backend.
pub struct FakeBackend {
    pub events: Vec<String>,
    /// Bytes per body frame; small values split lines and UTF-8 sequences.
    pub chunk_size: usize,
    pub rate_limit: bool,
    pub cost_error: Option<String>,
    pub stream_status: StatusCode,
    pub non_stream: Value,
    pub cost_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    pub non_stream_calls: AtomicUsize,
    pub requests: Mutex<Vec<Value>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            events: HAPPY.iter().map(|e| e.to_string()).collect(),
            chunk_size: 4096,
            rate_limit: false,
            cost_error: None,
            stream_status: StatusCode::OK,
            non_stream: json!({
                "status": "complete",
                "explanation": "AB",
                "mapping": "M",
                "diagram": "graph TD\n  A-->B"
            }),
            cost_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            non_stream_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBackend {
    pub fn cost_calls(&self) -> usize {
        self.cost_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn non_stream_calls(&self) -> usize {
        self.non_stream_calls.load(Ordering::SeqCst)
    }
}

async fn cost(State(fake): State<Arc<FakeBackend>>, Json(req): Json<Value>) -> Response {
    fake.cost_calls.fetch_add(1, Ordering::SeqCst);
    fake.requests.lock().unwrap().push(req);
    if fake.rate_limit {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    match &fake.cost_error {
        Some(error) => Json(json!({ "error": error })).into_response(),
        None => Json(json!({ "cost": "$0.12 USD" })).into_response(),
    }
}

async fn stream(State(fake): State<Arc<FakeBackend>>, Json(req): Json<Value>) -> Response {
    fake.stream_calls.fetch_add(1, Ordering::SeqCst);
    fake.requests.lock().unwrap().push(req);
    if !fake.stream_status.is_success() {
        return (fake.stream_status, "backend unavailable").into_response();
    }

    let body: String = fake
        .events
        .iter()
        .map(|e| format!("data: {}\n\n", e))
        .collect();
    let frames: Vec<Result<Bytes, std::io::Error>> = body
        .as_bytes()
        .chunks(fake.chunk_size.max(1))
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();

    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(futures::stream::iter(frames)),
    )
        .into_response()
}

async fn non_stream(State(fake): State<Arc<FakeBackend>>, Json(req): Json<Value>) -> Response {
    fake.non_stream_calls.fetch_add(1, Ordering::SeqCst);
    fake.requests.lock().unwrap().push(req);
    Json(fake.non_stream.clone()).into_response()
}

/// Bind the fake on an ephemeral port and return its base URL.
pub async fn serve(fake: Arc<FakeBackend>) -> String {
    let app = Router::new()
        .route("/generate/cost", post(cost))
        .route("/generate/stream", post(stream))
        .route("/generate/non-stream", post(non_stream))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ─── Config ─────────────────────────────────────────────────────────

pub fn write_config(tmp: &TempDir, base_url: &str, mode: &str) -> PathBuf {
    let config_dir = tmp.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let content = format!(
        r#"[backend]
base_url = "{}"
mode = "{}"
timeout_secs = 5
idle_timeout_secs = 5
github_token_env = "DGS_TEST_GITHUB_TOKEN"

[cache]
path = "{}/data/dgs.sqlite"
"#,
        base_url,
        mode,
        tmp.path().display()
    );

    let path = config_dir.join("dgs.toml");
    fs::write(&path, content).unwrap();
    path
}
