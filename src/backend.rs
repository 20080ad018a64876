//! The generation backend seam.
//!
//! [`GenerationBackend`] is everything the session controller needs from the
//! server: a cost estimate, a streamed generation, and a single-shot
//! generation. [`HttpBackend`](crate::client::HttpBackend) is the production
//! implementation; tests supply scripted ones.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use diagram_stream_core::error::GenerationError;
use diagram_stream_core::models::{GenerationRequest, WireMessage};

/// Raw response body of a streamed generation.
pub type ByteStream = BoxStream<'static, Result<Bytes, GenerationError>>;

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// `POST /generate/cost`. Returns the server's cost string, if any.
    ///
    /// HTTP 429 maps to [`GenerationError::RateLimited`]; an `error` field in
    /// the body to [`GenerationError::Cost`].
    async fn estimate_cost(&self, req: &GenerationRequest)
        -> Result<Option<String>, GenerationError>;

    /// `POST /generate/stream`. Fails with a transport error if the request
    /// cannot be started or the status is not 2xx.
    async fn open_stream(&self, req: &GenerationRequest) -> Result<ByteStream, GenerationError>;

    /// `POST /generate/non-stream`. Returns the raw response object; the
    /// caller validates its status.
    async fn generate_once(&self, req: &GenerationRequest) -> Result<WireMessage, GenerationError>;
}
