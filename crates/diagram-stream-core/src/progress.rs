//! Completion percentage and phase labels derived from accumulator state.
//!
//! Each macro-phase owns a slice of the bar:
//!
//! | Phase | Range |
//! |-------|-------|
//! | explanation | `[0, 35)` |
//! | mapping | `[35, 70)` |
//! | diagram | `[70, 100)` |
//!
//! Inside a phase the value climbs from the floor with buffer length along a
//! saturating curve that stops one point short of the ceiling. Only the
//! phase-transition message moves the bar into the next range, and
//! `complete` snaps it to 100.

use serde::{Deserialize, Serialize};

use crate::accumulator::PhaseAccumulator;
use crate::models::{Phase, SessionPhase};

/// Characters of output at which each phase's sub-range saturates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressScales {
    pub explanation: f64,
    pub mapping: f64,
    pub diagram: f64,
}

impl Default for ProgressScales {
    fn default() -> Self {
        Self {
            explanation: 1000.0,
            mapping: 500.0,
            diagram: 2000.0,
        }
    }
}

impl ProgressScales {
    fn for_phase(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Explanation => self.explanation,
            Phase::Mapping => self.mapping,
            Phase::Diagram => self.diagram,
        }
    }
}

/// `[floor, ceiling)` of a phase on the 0–100 bar.
pub fn phase_range(phase: Phase) -> (f64, f64) {
    match phase {
        Phase::Explanation => (0.0, 35.0),
        Phase::Mapping => (35.0, 70.0),
        Phase::Diagram => (70.0, 100.0),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressModel {
    scales: ProgressScales,
}

impl ProgressModel {
    pub fn new(scales: ProgressScales) -> Self {
        Self { scales }
    }

    /// Instantaneous estimate. Not monotonic on its own: a full-value replace
    /// can shorten a buffer. Use [`ProgressTracker`] for display.
    pub fn estimate(&self, acc: &PhaseAccumulator) -> f64 {
        match acc.phase() {
            SessionPhase::Idle | SessionPhase::Error => 0.0,
            SessionPhase::Started | SessionPhase::Explanation => {
                self.within(Phase::Explanation, acc)
            }
            SessionPhase::Mapping => self.within(Phase::Mapping, acc),
            SessionPhase::Diagram => self.within(Phase::Diagram, acc),
            SessionPhase::Complete => 100.0,
        }
    }

    fn within(&self, phase: Phase, acc: &PhaseAccumulator) -> f64 {
        let (floor, ceiling) = phase_range(phase);
        let margin = ceiling - floor - 1.0;
        let len = acc.buffer(phase).len() as f64;
        let scale = self.scales.for_phase(phase);
        if scale <= 0.0 {
            return floor;
        }
        floor + (len / scale * margin).min(margin)
    }
}

/// A published progress reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub phase: SessionPhase,
    pub percent: f64,
    pub label: &'static str,
}

/// Running maximum over [`ProgressModel`] estimates.
///
/// On error the last reading is held instead of resetting.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    model: ProgressModel,
    current: f64,
}

impl ProgressTracker {
    pub fn new(model: ProgressModel) -> Self {
        Self {
            model,
            current: 0.0,
        }
    }

    pub fn update(&mut self, acc: &PhaseAccumulator) -> Progress {
        if acc.phase() != SessionPhase::Error {
            self.current = self.current.max(self.model.estimate(acc));
        }
        Progress {
            phase: acc.phase(),
            percent: self.current,
            label: label(acc.phase()),
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }
}

/// Short UI label for a session phase.
pub fn label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Idle => "Waiting",
        SessionPhase::Started => "Starting",
        SessionPhase::Explanation => "Analyzing Repository",
        SessionPhase::Mapping => "Creating Component Map",
        SessionPhase::Diagram => "Generating Diagram",
        SessionPhase::Complete => "Generation Complete",
        SessionPhase::Error => "Generation Failed",
    }
}

pub fn description(phase: Phase) -> &'static str {
    match phase {
        Phase::Explanation => "Understanding code structure",
        Phase::Mapping => "Mapping files to components",
        Phase::Diagram => "Creating Mermaid diagram",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StreamMessage;

    fn chunk(phase: Phase, s: &str) -> StreamMessage {
        StreamMessage::PhaseChunk {
            phase,
            chunk: Some(s.to_string()),
        }
    }

    fn sent(phase: Phase) -> StreamMessage {
        StreamMessage::PhaseSent {
            phase,
            message: None,
        }
    }

    #[test]
    fn progress_is_monotonic_and_ends_at_100() {
        let big = "x".repeat(400);
        let messages = vec![
            StreamMessage::Started { message: None },
            sent(Phase::Explanation),
            chunk(Phase::Explanation, &big),
            chunk(Phase::Explanation, &big),
            chunk(Phase::Explanation, &big),
            sent(Phase::Mapping),
            chunk(Phase::Mapping, &big),
            chunk(Phase::Mapping, &big),
            sent(Phase::Diagram),
            StreamMessage::PhaseValue {
                phase: Phase::Diagram,
                value: Some("g".to_string()),
            },
            chunk(Phase::Diagram, &big),
            StreamMessage::Complete {
                explanation: None,
                mapping: None,
                diagram: None,
                message: None,
            },
        ];

        let mut acc = PhaseAccumulator::new();
        let mut tracker = ProgressTracker::default();
        let mut last = 0.0;
        for msg in &messages {
            acc.apply(msg);
            let p = tracker.update(&acc);
            assert!(p.percent >= last, "{} < {} after {:?}", p.percent, last, msg);
            last = p.percent;
        }
        assert_eq!(last, 100.0);
    }

    #[test]
    fn never_overshoots_into_next_phase() {
        let model = ProgressModel::default();
        let mut acc = PhaseAccumulator::new();
        acc.apply(&chunk(Phase::Explanation, &"x".repeat(1_000_000)));
        assert_eq!(model.estimate(&acc), 34.0);

        acc.apply(&sent(Phase::Mapping));
        assert_eq!(model.estimate(&acc), 35.0);
        acc.apply(&chunk(Phase::Mapping, &"x".repeat(250)));
        assert_eq!(model.estimate(&acc), 35.0 + 17.0);

        acc.apply(&chunk(Phase::Diagram, &"x".repeat(10_000)));
        assert_eq!(model.estimate(&acc), 99.0);
    }

    #[test]
    fn error_holds_last_value() {
        let mut acc = PhaseAccumulator::new();
        let mut tracker = ProgressTracker::default();
        acc.apply(&sent(Phase::Mapping));
        tracker.update(&acc);
        acc.apply(&StreamMessage::Error {
            message: "boom".to_string(),
        });
        let p = tracker.update(&acc);
        assert_eq!(p.percent, 35.0);
        assert_eq!(p.label, "Generation Failed");
    }

    #[test]
    fn labels_follow_phase() {
        assert_eq!(label(SessionPhase::Mapping), "Creating Component Map");
        assert_eq!(description(Phase::Diagram), "Creating Mermaid diagram");
    }
}
