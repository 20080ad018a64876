//! # Diagram Stream Core
//!
//! Runtime-agnostic logic for the incremental diagram generation protocol:
//! wire models, the SSE decoder, the phase accumulator, the progress model,
//! the error taxonomy, and the artifact cache trait.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. Byte streams
//! come in as any [`futures::Stream`], so the same decoder runs against a
//! reqwest body, a test fixture, or anything else that yields bytes.
//!
//! ## Pipeline
//!
//! ```text
//! bytes ──▶ SseDecoder ──▶ StreamMessage ──▶ PhaseAccumulator ──▶ ProgressTracker
//! ```
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Wire and domain types |
//! | [`decoder`] | SSE line framing and message decoding |
//! | [`accumulator`] | Phase buffers and session phase |
//! | [`progress`] | Percentage and labels |
//! | [`error`] | Fatal error taxonomy |
//! | [`cache`] | Artifact cache trait and in-memory implementation |

pub mod accumulator;
pub mod cache;
pub mod decoder;
pub mod error;
pub mod models;
pub mod progress;
