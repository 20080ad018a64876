//! Library-level tests: the real reqwest backend and SQLite cache driven by
//! a [`SessionController`] against the local fake backend.

mod common;

use std::sync::{Arc, Mutex};

use common::{serve, FakeBackend};
use diagram_stream::client::HttpBackend;
use diagram_stream::config::{Config, TransportMode};
use diagram_stream::db;
use diagram_stream::migrate;
use diagram_stream::progress::SessionReporter;
use diagram_stream::session::{
    ControllerState, Outcome, SessionController, SessionSettings, SessionSnapshot,
};
use diagram_stream::sqlite_cache::SqliteCache;
use diagram_stream_core::cache::ArtifactCache;
use diagram_stream_core::models::SessionPhase;
use tempfile::TempDir;

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<SessionSnapshot>>,
}

impl SessionReporter for Recorder {
    fn report(&self, snapshot: &SessionSnapshot) {
        self.seen.lock().unwrap().push(snapshot.clone());
    }
}

struct Fixture {
    _tmp: TempDir,
    config: Config,
    cache: Arc<SqliteCache>,
}

async fn fixture(base_url: &str, mode: TransportMode) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::with_cache_path(tmp.path().join("data/dgs.sqlite"));
    config.backend.base_url = base_url.to_string();
    config.backend.mode = mode;
    config.backend.idle_timeout_secs = 5;

    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    Fixture {
        _tmp: tmp,
        config,
        cache: Arc::new(SqliteCache::new(pool)),
    }
}

fn controller(fx: &Fixture, recorder: Arc<Recorder>) -> SessionController {
    let backend = HttpBackend::new(&fx.config.backend).unwrap();
    SessionController::new(
        "octo",
        "demo",
        Arc::new(backend),
        fx.cache.clone(),
        SessionSettings::from_config(&fx.config),
    )
    .with_reporter(recorder)
}

fn finished(outcome: Outcome) -> SessionSnapshot {
    match outcome {
        Outcome::Finished(snapshot) => snapshot,
        Outcome::Superseded => panic!("session was superseded"),
    }
}

// ─── Streaming ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_fragmented_stream_reassembles() {
    let fake = Arc::new(FakeBackend {
        events: vec![
            r#"{"status":"started"}"#.to_string(),
            r#"{"status":"diagram_sent"}"#.to_string(),
            r#"{"status":"diagram_chunk","chunk":"graph TD; café-->naïve"}"#.to_string(),
            r#"{"status":"complete","diagram":"graph TD; café-->naïve"}"#.to_string(),
        ],
        chunk_size: 3,
        ..Default::default()
    });
    let base = serve(fake.clone()).await;
    let fx = fixture(&base, TransportMode::Stream).await;
    let recorder = Arc::new(Recorder::default());

    let snap = finished(controller(&fx, recorder.clone()).start(None).await);
    assert_eq!(snap.state, ControllerState::Complete);
    assert_eq!(snap.diagram, "graph TD; café-->naïve");

    let seen = recorder.seen.lock().unwrap();
    assert!(seen
        .iter()
        .any(|s| s.phase == SessionPhase::Diagram && s.diagram == "graph TD; café-->naïve"));
}

#[tokio::test]
async fn test_end_to_end_persists_to_sqlite() {
    let fake = Arc::new(FakeBackend::default());
    let base = serve(fake.clone()).await;
    let fx = fixture(&base, TransportMode::Stream).await;
    let recorder = Arc::new(Recorder::default());

    let snap = finished(controller(&fx, recorder.clone()).start(None).await);
    assert_eq!(snap.progress, 100.0);
    assert_eq!(snap.explanation, "AB");
    assert_eq!(snap.mapping, "M");
    assert_eq!(snap.cost.as_deref(), Some("$0.12 USD"));

    let stored = fx.cache.get("octo", "demo").await.unwrap().unwrap();
    assert_eq!(stored.diagram, "graph TD\n  A-->B");
    assert_eq!(stored.explanation, "AB");
    assert_eq!(snap.last_generated, Some(stored.updated_at));

    let seen = recorder.seen.lock().unwrap();
    let percents: Vec<f64> = seen.iter().map(|s| s.progress).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
}

#[tokio::test]
async fn test_malformed_event_is_skipped() {
    let fake = Arc::new(FakeBackend {
        events: vec![
            "{not valid json".to_string(),
            r#"{"status":"explanation_chunk","chunk":"x"}"#.to_string(),
            r#"{"status":"complete"}"#.to_string(),
        ],
        ..Default::default()
    });
    let base = serve(fake.clone()).await;
    let fx = fixture(&base, TransportMode::Stream).await;

    let snap = finished(
        controller(&fx, Arc::new(Recorder::default()))
            .modify("")
            .await,
    );
    assert_eq!(snap.state, ControllerState::Complete);
    assert_eq!(snap.explanation, "x");
}

#[tokio::test]
async fn test_server_error_event_is_shown_verbatim() {
    let fake = Arc::new(FakeBackend {
        events: vec![
            r#"{"status":"started"}"#.to_string(),
            r#"{"status":"error","error":"Repository is too large"}"#.to_string(),
        ],
        ..Default::default()
    });
    let base = serve(fake.clone()).await;
    let fx = fixture(&base, TransportMode::Stream).await;

    let snap = finished(controller(&fx, Arc::new(Recorder::default())).start(None).await);
    assert_eq!(snap.state, ControllerState::Error);
    assert_eq!(snap.error.as_deref(), Some("Repository is too large"));
    assert!(fx.cache.get("octo", "demo").await.unwrap().is_none());
}

// ─── Cost ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cost_error_is_terminal() {
    let fake = Arc::new(FakeBackend {
        cost_error: Some("GitHub API rate limit reached".to_string()),
        ..Default::default()
    });
    let base = serve(fake.clone()).await;
    let fx = fixture(&base, TransportMode::Stream).await;

    let snap = finished(controller(&fx, Arc::new(Recorder::default())).start(None).await);
    assert_eq!(snap.error.as_deref(), Some("GitHub API rate limit reached"));
    assert_eq!(snap.error_kind, Some("cost"));
    assert_eq!(fake.stream_calls(), 0);
}

#[tokio::test]
async fn test_unreachable_backend_fails_cost() {
    let fx = fixture("http://127.0.0.1:9", TransportMode::Stream).await;

    let snap = finished(controller(&fx, Arc::new(Recorder::default())).start(None).await);
    assert_eq!(snap.error.as_deref(), Some("Failed to get cost estimate."));
    assert!(!snap.loading);
}

// ─── Non-stream ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_non_stream_unexpected_status() {
    let fake = Arc::new(FakeBackend {
        non_stream: serde_json::json!({ "status": "started" }),
        ..Default::default()
    });
    let base = serve(fake.clone()).await;
    let fx = fixture(&base, TransportMode::NonStream).await;

    let snap = finished(controller(&fx, Arc::new(Recorder::default())).start(None).await);
    assert_eq!(snap.error.as_deref(), Some("Unexpected response status"));
    assert_eq!(fake.non_stream_calls(), 1);
}
