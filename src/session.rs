//! Session controller: one generation attempt for an (owner, repo) pair.
//!
//! Drives the whole flow:
//!
//! ```text
//! idle → checking_cache → estimating_cost → streaming → complete
//!                 └── cache hit ──────────────────────→ complete
//! (any state) ──────────────────────────────────────→ error
//! ```
//!
//! Every [`start`](SessionController::start),
//! [`regenerate`](SessionController::regenerate) and
//! [`modify`](SessionController::modify) call gets a fresh generation id, a
//! fresh decoder and fresh buffers. Publishing a snapshot checks the id under
//! the snapshot lock, so once a newer call (or [`discard`](SessionController::discard))
//! has bumped the id, the older attempt can no longer publish, stops reading
//! its stream, and never writes the cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::Notify;

use diagram_stream_core::accumulator::PhaseAccumulator;
use diagram_stream_core::cache::ArtifactCache;
use diagram_stream_core::decoder::MessageStream;
use diagram_stream_core::error::GenerationError;
use diagram_stream_core::models::{
    CachedArtifact, GenerationRequest, SessionPhase, StreamMessage, WireMessage,
};
use diagram_stream_core::progress::{self, ProgressModel, ProgressScales, ProgressTracker};

use crate::backend::{ByteStream, GenerationBackend};
use crate::config::{Config, TransportMode};
use crate::progress::{NoProgress, SessionReporter};

const ENDED_EARLY_MESSAGE: &str = "Generation ended unexpectedly. Please try again.";

/// Where the controller is in its own flow, as opposed to the
/// [`SessionPhase`] reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    CheckingCache,
    EstimatingCost,
    Streaming,
    Complete,
    Error,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::CheckingCache => "checking_cache",
            ControllerState::EstimatingCost => "estimating_cost",
            ControllerState::Streaming => "streaming",
            ControllerState::Complete => "complete",
            ControllerState::Error => "error",
        }
    }

    pub fn is_streaming(&self) -> bool {
        *self == ControllerState::Streaming
    }

    /// Short human description used by the stderr reporter.
    pub fn describe(&self) -> &'static str {
        match self {
            ControllerState::Idle => "Waiting",
            ControllerState::CheckingCache => "Checking cache",
            ControllerState::EstimatingCost => "Estimating cost",
            ControllerState::Streaming => "Generating",
            ControllerState::Complete => "Complete",
            ControllerState::Error => "Failed",
        }
    }
}

/// Consumer-facing view of a session at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub owner: String,
    pub repo: String,
    pub state: ControllerState,
    pub regenerating: bool,
    pub phase: SessionPhase,
    pub progress: f64,
    pub label: &'static str,
    pub explanation: String,
    pub mapping: String,
    pub diagram: String,
    pub message: Option<String>,
    pub cost: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
    pub last_generated: Option<DateTime<Utc>>,
    pub from_cache: bool,
    pub loading: bool,
}

impl SessionSnapshot {
    pub fn idle(generation: u64, owner: &str, repo: &str) -> Self {
        Self {
            generation,
            owner: owner.to_string(),
            repo: repo.to_string(),
            state: ControllerState::Idle,
            regenerating: false,
            phase: SessionPhase::Idle,
            progress: 0.0,
            label: progress::label(SessionPhase::Idle),
            explanation: String::new(),
            mapping: String::new(),
            diagram: String::new(),
            message: None,
            cost: None,
            error: None,
            error_kind: None,
            last_generated: None,
            from_cache: false,
            loading: false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.state == ControllerState::Error
    }
}

/// Knobs the controller needs, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub mode: TransportMode,
    /// Longest allowed gap between received chunks (stream mode) or the
    /// whole response (non-stream mode).
    pub idle_timeout: Duration,
    pub scales: ProgressScales,
    pub github_token: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            mode: TransportMode::Stream,
            idle_timeout: Duration::from_secs(120),
            scales: ProgressScales::default(),
            github_token: String::new(),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.backend.mode,
            idle_timeout: config.backend.idle_timeout(),
            scales: config.progress.scales(),
            github_token: config.backend.github_token(),
        }
    }
}

/// How a session run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Reached `complete` or `error`; carries the final snapshot.
    Finished(SessionSnapshot),
    /// A newer request or a discard took over; nothing was published after
    /// that point.
    Superseded,
}

impl Outcome {
    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        match self {
            Outcome::Finished(snapshot) => Some(snapshot),
            Outcome::Superseded => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Start,
    Regenerate,
    Modify,
}

pub struct SessionController {
    owner: String,
    repo: String,
    backend: Arc<dyn GenerationBackend>,
    cache: Arc<dyn ArtifactCache>,
    settings: SessionSettings,
    reporter: Arc<dyn SessionReporter>,
    active: AtomicU64,
    current: Mutex<SessionSnapshot>,
    superseded: Notify,
    persist: tokio::sync::Mutex<()>,
}

impl SessionController {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        backend: Arc<dyn GenerationBackend>,
        cache: Arc<dyn ArtifactCache>,
        settings: SessionSettings,
    ) -> Self {
        let owner = owner.into();
        let repo = repo.into();
        let current = Mutex::new(SessionSnapshot::idle(0, &owner, &repo));
        Self {
            owner,
            repo,
            backend,
            cache,
            settings,
            reporter: Arc::new(NoProgress),
            active: AtomicU64::new(0),
            current,
            superseded: Notify::new(),
            persist: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn SessionReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().clone()
    }

    /// Abandon whatever is in flight and go back to idle.
    pub fn discard(&self) {
        let mut current = self.lock();
        let id = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        *current = SessionSnapshot::idle(id, &self.owner, &self.repo);
        self.superseded.notify_waiters();
        tracing::debug!(owner = %self.owner, repo = %self.repo, generation = id, "session discarded");
    }

    /// Serve from the cache when possible, otherwise estimate cost and
    /// generate.
    pub async fn start(&self, instructions: Option<&str>) -> Outcome {
        self.run(Trigger::Start, instructions.unwrap_or_default())
            .await
    }

    /// Bypass the cache, re-estimate cost and generate again.
    pub async fn regenerate(&self, instructions: &str) -> Outcome {
        self.run(Trigger::Regenerate, instructions).await
    }

    /// Bypass the cache and generate with new instructions, without a cost
    /// estimate.
    pub async fn modify(&self, instructions: &str) -> Outcome {
        self.run(Trigger::Modify, instructions).await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionSnapshot> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn begin(&self) -> u64 {
        let mut current = self.lock();
        let id = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        *current = SessionSnapshot::idle(id, &self.owner, &self.repo);
        self.superseded.notify_waiters();
        id
    }

    fn is_active(&self, id: u64) -> bool {
        self.active.load(Ordering::SeqCst) == id
    }

    /// Replace the shared snapshot if `snapshot` still belongs to the
    /// active generation. Returns false when it has been superseded.
    fn publish(&self, snapshot: &SessionSnapshot) -> bool {
        let mut current = self.lock();
        if !self.is_active(snapshot.generation) {
            return false;
        }
        *current = snapshot.clone();
        self.reporter.report(snapshot);
        true
    }

    async fn run(&self, trigger: Trigger, instructions: &str) -> Outcome {
        let id = self.begin();
        let mut attempt = Attempt::new(self, id, trigger);
        tracing::info!(
            owner = %self.owner,
            repo = %self.repo,
            generation = id,
            trigger = ?trigger,
            "session started"
        );

        let request = GenerationRequest {
            username: self.owner.clone(),
            repo: self.repo.clone(),
            github_access_token: self.settings.github_token.clone(),
            instructions: instructions.to_string(),
        };

        if trigger == Trigger::Start {
            attempt.enter(ControllerState::CheckingCache);
            if !attempt.publish() {
                return Outcome::Superseded;
            }
            match self.cache.get(&self.owner, &self.repo).await {
                Ok(Some(artifact)) => {
                    if !self.is_active(id) {
                        return Outcome::Superseded;
                    }
                    return attempt.from_cache(artifact);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, owner = %self.owner, repo = %self.repo, "cache lookup failed");
                }
            }
        }

        if trigger != Trigger::Modify {
            attempt.enter(ControllerState::EstimatingCost);
            if !attempt.publish() {
                return Outcome::Superseded;
            }
            let cost = self.backend.estimate_cost(&request).await;
            if !self.is_active(id) {
                return Outcome::Superseded;
            }
            match cost {
                Ok(cost) => attempt.snap.cost = cost,
                Err(e) => return attempt.fail(e),
            }
        }

        attempt.enter(ControllerState::Streaming);
        if !attempt.publish() {
            return Outcome::Superseded;
        }

        let result = match self.settings.mode {
            TransportMode::Stream => attempt.stream(&request).await,
            TransportMode::NonStream => attempt.single_shot(&request).await,
        };

        match result {
            Ok(Flow::Superseded) => Outcome::Superseded,
            Ok(Flow::Complete) => attempt.complete().await,
            Err(e) => attempt.fail(e),
        }
    }
}

enum Flow {
    Complete,
    Superseded,
}

/// Working state of one run. Only ever touched by the task driving it.
struct Attempt<'a> {
    ctl: &'a SessionController,
    snap: SessionSnapshot,
    acc: PhaseAccumulator,
    tracker: ProgressTracker,
}

impl<'a> Attempt<'a> {
    fn new(ctl: &'a SessionController, id: u64, trigger: Trigger) -> Self {
        let mut snap = SessionSnapshot::idle(id, &ctl.owner, &ctl.repo);
        snap.regenerating = trigger != Trigger::Start;
        snap.loading = true;
        Self {
            ctl,
            snap,
            acc: PhaseAccumulator::new(),
            tracker: ProgressTracker::new(ProgressModel::new(ctl.settings.scales)),
        }
    }

    fn id(&self) -> u64 {
        self.snap.generation
    }

    fn enter(&mut self, state: ControllerState) {
        tracing::debug!(generation = self.id(), state = state.as_str(), "session state");
        self.snap.state = state;
    }

    fn publish(&self) -> bool {
        self.ctl.publish(&self.snap)
    }

    /// Copy accumulator state and the running progress into the snapshot.
    fn absorb(&mut self) {
        let reading = self.tracker.update(&self.acc);
        self.snap.phase = reading.phase;
        self.snap.progress = reading.percent;
        self.snap.label = reading.label;
        self.snap.explanation = self.acc.explanation().to_string();
        self.snap.mapping = self.acc.mapping().to_string();
        self.snap.diagram = self.acc.diagram().to_string();
        self.snap.message = self.acc.message().map(str::to_string);
    }

    fn from_cache(mut self, artifact: CachedArtifact) -> Outcome {
        tracing::info!(owner = %artifact.owner, repo = %artifact.repo, "serving cached diagram");
        self.snap.state = ControllerState::Complete;
        self.snap.phase = SessionPhase::Complete;
        self.snap.progress = 100.0;
        self.snap.label = progress::label(SessionPhase::Complete);
        self.snap.diagram = artifact.diagram;
        self.snap.explanation = artifact.explanation;
        self.snap.last_generated = Some(artifact.updated_at);
        self.snap.from_cache = true;
        self.snap.loading = false;
        self.finish()
    }

    fn finish(self) -> Outcome {
        if self.publish() {
            Outcome::Finished(self.snap)
        } else {
            Outcome::Superseded
        }
    }

    /// Apply one message and publish. `Err` when the message ends the
    /// session in error.
    fn step(&mut self, msg: &StreamMessage) -> Result<bool, GenerationError> {
        self.acc.apply(msg);
        tracing::debug!(generation = self.id(), phase = self.acc.phase().as_str(), message = ?msg, "applied message");
        if let StreamMessage::Error { message } = msg {
            return Err(GenerationError::Protocol(message.clone()));
        }
        self.absorb();
        Ok(self.publish())
    }

    async fn stream(&mut self, request: &GenerationRequest) -> Result<Flow, GenerationError> {
        let limit = self.ctl.settings.idle_timeout;
        let body = tokio::time::timeout(limit, self.ctl.backend.open_stream(request))
            .await
            .map_err(|_| GenerationError::idle_timeout(limit))??;

        let ctl = self.ctl;
        let mut messages = MessageStream::new(with_idle_timeout(body, limit));
        loop {
            // Register for the wakeup before checking the id, so a bump that
            // lands between the check and the select is not lost.
            let superseded = ctl.superseded.notified();
            tokio::pin!(superseded);
            superseded.as_mut().enable();

            if !ctl.is_active(self.id()) {
                tracing::debug!(generation = self.id(), "superseded, dropping stream");
                return Ok(Flow::Superseded);
            }
            let item = tokio::select! {
                item = messages.next_message() => item,
                _ = &mut superseded => continue,
            };
            let item = match item {
                Some(item) => item,
                None => break,
            };
            if !ctl.is_active(self.id()) {
                return Ok(Flow::Superseded);
            }
            let msg = item?;
            if !self.step(&msg)? {
                return Ok(Flow::Superseded);
            }
            if self.acc.phase() == SessionPhase::Complete {
                return Ok(Flow::Complete);
            }
        }

        if messages.skipped() > 0 {
            tracing::warn!(skipped = messages.skipped(), "stream ended after skipping malformed events");
        }
        Err(GenerationError::transport(
            ENDED_EARLY_MESSAGE,
            "response body ended before a complete message",
        ))
    }

    async fn single_shot(&mut self, request: &GenerationRequest) -> Result<Flow, GenerationError> {
        self.snap.message = Some("Generating diagram...".to_string());
        if !self.publish() {
            return Ok(Flow::Superseded);
        }

        let limit = self.ctl.settings.idle_timeout;
        let wire = tokio::time::timeout(limit, self.ctl.backend.generate_once(request))
            .await
            .map_err(|_| GenerationError::idle_timeout(limit))??;
        if !self.ctl.is_active(self.id()) {
            return Ok(Flow::Superseded);
        }

        let msg = classify_single(wire)?;
        if !self.step(&msg)? {
            return Ok(Flow::Superseded);
        }
        Ok(Flow::Complete)
    }

    async fn complete(mut self) -> Outcome {
        let ctl = self.ctl;
        self.snap.state = ControllerState::Complete;
        self.snap.loading = false;

        // Held across the write: a newer run's put waits for this one, and
        // once the id has moved on this run never writes.
        let persist = ctl.persist.lock().await;
        if !ctl.is_active(self.id()) {
            return Outcome::Superseded;
        }
        if !self.snap.diagram.is_empty() {
            if let Err(e) = ctl
                .cache
                .put(&ctl.owner, &ctl.repo, &self.snap.diagram, &self.snap.explanation)
                .await
            {
                tracing::warn!(error = %e, owner = %ctl.owner, repo = %ctl.repo, "failed to cache diagram");
            }
        }
        drop(persist);

        let last = match ctl.cache.last_generated_at(&ctl.owner, &ctl.repo).await {
            Ok(last) => last,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read last generated date");
                None
            }
        };
        self.snap.last_generated = Some(last.unwrap_or_else(Utc::now));

        tracing::info!(
            owner = %ctl.owner,
            repo = %ctl.repo,
            generation = self.id(),
            diagram_len = self.snap.diagram.len(),
            "session complete"
        );
        self.finish()
    }

    fn fail(mut self, error: GenerationError) -> Outcome {
        match &error {
            GenerationError::Transport { detail, .. } => {
                tracing::error!(generation = self.id(), kind = error.kind(), %detail, "session failed: {}", error)
            }
            _ => tracing::error!(generation = self.id(), kind = error.kind(), "session failed: {}", error),
        }
        let message = error.user_message();
        self.acc.fail(message.clone());
        let reading = self.tracker.update(&self.acc);
        self.snap.state = ControllerState::Error;
        self.snap.phase = reading.phase;
        self.snap.progress = reading.percent;
        self.snap.label = reading.label;
        self.snap.error = Some(message);
        self.snap.error_kind = Some(error.kind());
        self.snap.loading = false;
        self.finish()
    }
}

/// A single-shot response must be `complete`; an `error` field wins.
fn classify_single(wire: WireMessage) -> Result<StreamMessage, GenerationError> {
    if let Some(error) = wire.error.as_deref().filter(|e| !e.is_empty()) {
        return Err(GenerationError::Protocol(error.to_string()));
    }
    if wire.status != "complete" {
        return Err(GenerationError::UnexpectedStatus(wire.status));
    }
    StreamMessage::from_wire(wire)
}

/// Fail the body with [`GenerationError::idle_timeout`] when no chunk
/// arrives within `limit`.
fn with_idle_timeout(
    body: ByteStream,
    limit: Duration,
) -> BoxStream<'static, Result<bytes::Bytes, GenerationError>> {
    futures::stream::unfold(Some(body), move |body| async move {
        let mut body = match body {
            Some(body) => body,
            None => return None,
        };
        match tokio::time::timeout(limit, body.next()).await {
            Ok(Some(item)) => Some((item, Some(body))),
            Ok(None) => None,
            Err(_) => Some((Err(GenerationError::idle_timeout(limit)), None)),
        }
    })
    .boxed()
}
