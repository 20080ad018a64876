//! Session progress reporting.
//!
//! Reports observable progress while a diagram is generated so users see
//! which phase is running and how far along it is. Progress is emitted on
//! **stderr** so stdout stays reserved for the diagram itself.
//!
//! The controller publishes a snapshot for every applied message; reporters
//! coalesce by only emitting when the label or the whole-number percentage
//! changes.

use std::io::Write;
use std::sync::{Arc, Mutex};

use diagram_stream_core::progress;

use crate::session::{ControllerState, SessionSnapshot};

/// Receives every published [`SessionSnapshot`].
pub trait SessionReporter: Send + Sync {
    fn report(&self, snapshot: &SessionSnapshot);
}

/// Remembers the last (state, label, percent) emitted so repeats are skipped.
#[derive(Default)]
struct Coalesce {
    last: Mutex<Option<(ControllerState, &'static str, u32)>>,
}

impl Coalesce {
    fn changed(&self, snapshot: &SessionSnapshot) -> bool {
        let key = (
            snapshot.state,
            snapshot.label,
            snapshot.progress.floor() as u32,
        );
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.as_ref() == Some(&key) {
            return false;
        }
        *last = Some(key);
        true
    }
}

/// Human-friendly progress on stderr:
/// "octo/demo  Creating Component Map  52%  (Mapping files to components)".
#[derive(Default)]
pub struct StderrProgress {
    coalesce: Coalesce,
}

impl SessionReporter for StderrProgress {
    fn report(&self, snapshot: &SessionSnapshot) {
        if !self.coalesce.changed(snapshot) {
            return;
        }
        let target = format!("{}/{}", snapshot.owner, snapshot.repo);
        let line = match (&snapshot.error, snapshot.loading) {
            (Some(error), _) => format!("{}  failed  {}\n", target, error),
            (None, true) if snapshot.state.is_streaming() => {
                let detail = snapshot
                    .phase
                    .stage()
                    .map(|stage| format!("  ({})", progress::description(stage)))
                    .unwrap_or_default();
                format!(
                    "{}  {}  {}{}\n",
                    target,
                    snapshot.label,
                    format_percent(snapshot.progress),
                    detail
                )
            }
            (None, true) => format!("{}  {}...\n", target, snapshot.state.describe()),
            (None, false) => format!(
                "{}  {}{}\n",
                target,
                snapshot.label,
                if snapshot.from_cache { " (cached)" } else { "" }
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
#[derive(Default)]
pub struct JsonProgress {
    coalesce: Coalesce,
}

impl SessionReporter for JsonProgress {
    fn report(&self, snapshot: &SessionSnapshot) {
        if !self.coalesce.changed(snapshot) {
            return;
        }
        let obj = serde_json::json!({
            "event": "progress",
            "generation": snapshot.generation,
            "owner": snapshot.owner,
            "repo": snapshot.repo,
            "state": snapshot.state,
            "phase": snapshot.phase,
            "label": snapshot.label,
            "progress": snapshot.progress,
            "message": snapshot.message,
            "error": snapshot.error,
            "error_kind": snapshot.error_kind,
            "loading": snapshot.loading,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SessionReporter for NoProgress {
    fn report(&self, _snapshot: &SessionSnapshot) {}
}

fn format_percent(p: f64) -> String {
    format!("{}%", p.clamp(0.0, 100.0).floor() as u32)
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn SessionReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress::default()),
            ProgressMode::Json => Arc::new(JsonProgress::default()),
        }
    }
}
