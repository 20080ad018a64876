//! Error taxonomy for a generation attempt.
//!
//! Every variant here is fatal to the session that produced it. Malformed
//! JSON on a `data:` line is not an error at this level: the decoder logs and
//! skips it.

use std::time::Duration;

use thiserror::Error;

pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";
pub const COST_FAILED_MESSAGE: &str = "Failed to get cost estimate.";
pub const START_FAILED_MESSAGE: &str = "Failed to start streaming";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Request failed, non-2xx status, missing body, interrupted read, or
    /// idle timeout. `detail` is for logs only.
    #[error("{message}")]
    Transport { message: String, detail: String },

    /// HTTP 429 from the cost endpoint.
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    /// Cost estimation failed; the message is shown verbatim.
    #[error("{0}")]
    Cost(String),

    /// Explicit `error` message from the server; shown verbatim.
    #[error("{0}")]
    Protocol(String),

    /// A `status` outside the known set, or a non-`complete` single-shot
    /// response. Holds the offending status.
    #[error("Unexpected response status")]
    UnexpectedStatus(String),
}

impl GenerationError {
    pub fn transport(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            detail: detail.into(),
        }
    }

    /// The stream could not be opened.
    pub fn start_failed(detail: impl Into<String>) -> Self {
        Self::transport(START_FAILED_MESSAGE, detail)
    }

    /// No bytes arrived within `limit`.
    pub fn idle_timeout(limit: Duration) -> Self {
        Self::transport(
            "Generation stream timed out. Please try again.",
            format!("no data received for {}s", limit.as_secs()),
        )
    }

    /// Short machine-readable name, used in JSON progress output.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Transport { .. } => "transport",
            GenerationError::RateLimited => "rate_limit",
            GenerationError::Cost(_) => "cost",
            GenerationError::Protocol(_) => "protocol",
            GenerationError::UnexpectedStatus(_) => "unexpected_status",
        }
    }

    /// Text safe to show to the user. Same as `Display`.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}
