//! Reduction of the message sequence into phase buffers.
//!
//! [`PhaseAccumulator`] is a plain state machine: no I/O, no clocks. Replaying
//! the same ordered messages always produces the same state.

use crate::models::{Phase, SessionPhase, StreamMessage};

/// One accumulating text buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseBuffer {
    content: String,
    finalized: bool,
    // Set by the first chunk; a full value clears it so the next chunk
    // starts the buffer over.
    chunking: bool,
}

impl PhaseBuffer {
    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// The phase's terminal non-chunk message has been seen.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn append(&mut self, chunk: &str) {
        if !self.chunking {
            self.content.clear();
            self.chunking = true;
        }
        self.content.push_str(chunk);
    }

    fn replace(&mut self, value: &str) {
        self.content.clear();
        self.content.push_str(value);
        self.chunking = false;
    }
}

/// Whether the consumer should keep reading after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseAccumulator {
    phase: SessionPhase,
    explanation: PhaseBuffer,
    mapping: PhaseBuffer,
    diagram: PhaseBuffer,
    message: Option<String>,
    error: Option<String>,
}

impl Default for PhaseAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseAccumulator {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            explanation: PhaseBuffer::default(),
            mapping: PhaseBuffer::default(),
            diagram: PhaseBuffer::default(),
            message: None,
            error: None,
        }
    }

    /// Fold a whole sequence, stopping at the first terminal message.
    pub fn replay<'a, I>(messages: I) -> Self
    where
        I: IntoIterator<Item = &'a StreamMessage>,
    {
        let mut acc = Self::new();
        for msg in messages {
            if acc.apply(msg) == Step::Stop {
                break;
            }
        }
        acc
    }

    /// Apply one message. Returns [`Step::Stop`] once the session is terminal;
    /// messages applied after that are ignored.
    pub fn apply(&mut self, msg: &StreamMessage) -> Step {
        if self.phase.is_terminal() {
            return Step::Stop;
        }
        if let Some(text) = msg.status_message() {
            self.message = Some(text.to_string());
        }

        match msg {
            StreamMessage::Started { .. } => self.advance(SessionPhase::Started),
            StreamMessage::PhaseSent { phase, .. } => match phase {
                Phase::Explanation => self.advance(SessionPhase::Started),
                other => self.advance((*other).into()),
            },
            StreamMessage::PhaseValue { phase, value } => {
                if let Some(value) = value {
                    self.buffer_mut(*phase).replace(value);
                }
                self.advance((*phase).into());
            }
            StreamMessage::PhaseChunk { phase, chunk } => {
                if let Some(chunk) = chunk {
                    self.buffer_mut(*phase).append(chunk);
                }
                self.advance((*phase).into());
            }
            StreamMessage::Complete {
                explanation,
                mapping,
                diagram,
                ..
            } => {
                for (phase, value) in [
                    (Phase::Explanation, explanation),
                    (Phase::Mapping, mapping),
                    (Phase::Diagram, diagram),
                ] {
                    let buf = self.buffer_mut(phase);
                    if let Some(value) = value {
                        buf.replace(value);
                    }
                    buf.finalized = true;
                }
                self.phase = SessionPhase::Complete;
                return Step::Stop;
            }
            StreamMessage::Error { message } => {
                self.fail(message.clone());
                return Step::Stop;
            }
        }
        Step::Continue
    }

    /// Move to the error state from outside the message flow (transport
    /// failures, timeouts). Buffers are left as they are.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.phase = SessionPhase::Error;
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn buffer(&self, phase: Phase) -> &PhaseBuffer {
        match phase {
            Phase::Explanation => &self.explanation,
            Phase::Mapping => &self.mapping,
            Phase::Diagram => &self.diagram,
        }
    }

    pub fn explanation(&self) -> &str {
        self.explanation.as_str()
    }

    pub fn mapping(&self) -> &str {
        self.mapping.as_str()
    }

    pub fn diagram(&self) -> &str {
        self.diagram.as_str()
    }

    /// Latest status text sent by the server.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn buffer_mut(&mut self, phase: Phase) -> &mut PhaseBuffer {
        match phase {
            Phase::Explanation => &mut self.explanation,
            Phase::Mapping => &mut self.mapping,
            Phase::Diagram => &mut self.diagram,
        }
    }

    // Forward-only. Entering a phase finalizes every earlier one.
    fn advance(&mut self, to: SessionPhase) {
        if to <= self.phase {
            return;
        }
        self.phase = to;
        for phase in Phase::ALL {
            if SessionPhase::from(phase) < to {
                self.buffer_mut(phase).finalized = true;
            }
        }
    }
}
