//! Wire and domain models for the diagram generation protocol.
//!
//! [`WireMessage`] mirrors the JSON objects carried on `data:` lines;
//! [`StreamMessage`] is the typed form the rest of the pipeline consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// One of the three sequential generation stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Explanation,
    Mapping,
    Diagram,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Explanation, Phase::Mapping, Phase::Diagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Explanation => "explanation",
            Phase::Mapping => "mapping",
            Phase::Diagram => "diagram",
        }
    }

    fn from_wire(s: &str) -> Option<Self> {
        Phase::ALL.into_iter().find(|phase| phase.as_str() == s)
    }
}

/// Overall phase of a generation session.
///
/// Declaration order is the forward order; `Error` may be entered from any
/// state and is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Started,
    Explanation,
    Mapping,
    Diagram,
    Complete,
    Error,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Complete | SessionPhase::Error)
    }

    /// The generation stage this phase is working on, if any.
    pub fn stage(&self) -> Option<Phase> {
        match self {
            SessionPhase::Explanation => Some(Phase::Explanation),
            SessionPhase::Mapping => Some(Phase::Mapping),
            SessionPhase::Diagram => Some(Phase::Diagram),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Started => "started",
            SessionPhase::Explanation => "explanation",
            SessionPhase::Mapping => "mapping",
            SessionPhase::Diagram => "diagram",
            SessionPhase::Complete => "complete",
            SessionPhase::Error => "error",
        }
    }
}

impl From<Phase> for SessionPhase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Explanation => SessionPhase::Explanation,
            Phase::Mapping => SessionPhase::Mapping,
            Phase::Diagram => SessionPhase::Diagram,
        }
    }
}

/// Request body shared by the stream, non-stream, and cost endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub username: String,
    pub repo: String,
    pub github_access_token: String,
    pub instructions: String,
}

/// Raw JSON object decoded from a `data:` line or a non-stream response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /generate/cost`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostResponse {
    #[serde(default)]
    pub cost: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A typed protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    Started {
        message: Option<String>,
    },
    /// `{phase}_sent`: the server is about to produce this phase.
    PhaseSent {
        phase: Phase,
        message: Option<String>,
    },
    /// `{phase}`: a full value for the phase, replacing anything accumulated.
    /// The server sends its status text here before the first chunk, which
    /// then starts the buffer over.
    PhaseValue {
        phase: Phase,
        value: Option<String>,
    },
    /// `{phase}_chunk`: an incremental fragment to append.
    PhaseChunk {
        phase: Phase,
        chunk: Option<String>,
    },
    Complete {
        explanation: Option<String>,
        mapping: Option<String>,
        diagram: Option<String>,
        message: Option<String>,
    },
    Error {
        message: String,
    },
}

impl StreamMessage {
    /// `complete` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamMessage::Complete { .. } | StreamMessage::Error { .. })
    }

    /// Human-readable status text attached to the message, if any.
    ///
    /// `PhaseValue` carries its payload in the wire `message` field, so it
    /// never contributes status text.
    pub fn status_message(&self) -> Option<&str> {
        match self {
            StreamMessage::Started { message }
            | StreamMessage::PhaseSent { message, .. }
            | StreamMessage::Complete { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Classify a decoded wire object.
    ///
    /// Fails only for a `status` outside the known set.
    pub fn from_wire(wire: WireMessage) -> Result<Self, GenerationError> {
        // A top-level error wins over whatever status was declared.
        if let Some(error) = wire.error.filter(|e| !e.is_empty()) {
            return Ok(StreamMessage::Error { message: error });
        }

        let status = wire.status.as_str();
        match status {
            "started" => Ok(StreamMessage::Started {
                message: wire.message,
            }),
            "complete" => Ok(StreamMessage::Complete {
                explanation: wire.explanation,
                mapping: wire.mapping,
                diagram: wire.diagram,
                message: wire.message,
            }),
            "error" => Ok(StreamMessage::Error {
                message: wire
                    .message
                    .unwrap_or_else(|| "An unknown error occurred".to_string()),
            }),
            _ => {
                if let Some(phase) = status.strip_suffix("_chunk").and_then(Phase::from_wire) {
                    return Ok(StreamMessage::PhaseChunk {
                        phase,
                        chunk: wire.chunk,
                    });
                }
                if let Some(phase) = status.strip_suffix("_sent").and_then(Phase::from_wire) {
                    return Ok(StreamMessage::PhaseSent {
                        phase,
                        message: wire.message,
                    });
                }
                if let Some(phase) = Phase::from_wire(status) {
                    return Ok(StreamMessage::PhaseValue {
                        phase,
                        value: wire.message,
                    });
                }
                Err(GenerationError::UnexpectedStatus(status.to_string()))
            }
        }
    }
}

/// The last successfully generated artifact for an (owner, repo) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedArtifact {
    pub owner: String,
    pub repo: String,
    pub diagram: String,
    pub explanation: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(json: &str) -> WireMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn request_uses_camel_case_token_field() {
        let req = GenerationRequest {
            username: "octo".to_string(),
            repo: "demo".to_string(),
            github_access_token: "tok".to_string(),
            instructions: String::new(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["githubAccessToken"], "tok");
        assert_eq!(json["username"], "octo");
        assert_eq!(json["instructions"], "");
    }

    #[test]
    fn phase_statuses_map_to_variants() {
        let msg = StreamMessage::from_wire(wire(r#"{"status":"mapping_chunk","chunk":"m"}"#));
        assert_eq!(
            msg.unwrap(),
            StreamMessage::PhaseChunk {
                phase: Phase::Mapping,
                chunk: Some("m".to_string())
            }
        );

        let msg = StreamMessage::from_wire(wire(r#"{"status":"diagram_sent","message":"go"}"#));
        assert_eq!(
            msg.unwrap(),
            StreamMessage::PhaseSent {
                phase: Phase::Diagram,
                message: Some("go".to_string())
            }
        );

        let msg = StreamMessage::from_wire(wire(r#"{"status":"explanation","message":"full"}"#));
        assert_eq!(
            msg.unwrap(),
            StreamMessage::PhaseValue {
                phase: Phase::Explanation,
                value: Some("full".to_string())
            }
        );
    }

    #[test]
    fn error_field_overrides_status() {
        let msg =
            StreamMessage::from_wire(wire(r#"{"status":"diagram_chunk","chunk":"x","error":"boom"}"#))
                .unwrap();
        assert_eq!(
            msg,
            StreamMessage::Error {
                message: "boom".to_string()
            }
        );
        assert!(msg.is_terminal());
    }

    #[test]
    fn unknown_status_is_unexpected() {
        let err = StreamMessage::from_wire(wire(r#"{"status":"thinking"}"#)).unwrap_err();
        assert_eq!(err, GenerationError::UnexpectedStatus("thinking".to_string()));
        assert_eq!(err.to_string(), "Unexpected response status");
    }

    #[test]
    fn session_phase_order_is_forward_order() {
        assert!(SessionPhase::Idle < SessionPhase::Started);
        assert!(SessionPhase::Explanation < SessionPhase::Mapping);
        assert!(SessionPhase::Diagram < SessionPhase::Complete);
        assert_eq!(SessionPhase::from(Phase::Mapping), SessionPhase::Mapping);
    }

    #[test]
    fn stage_round_trips_through_session_phase() {
        for phase in Phase::ALL {
            assert_eq!(SessionPhase::from(phase).stage(), Some(phase));
        }
        assert_eq!(SessionPhase::Started.stage(), None);
        assert_eq!(SessionPhase::Complete.stage(), None);
    }
}
