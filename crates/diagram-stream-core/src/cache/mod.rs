//! Artifact cache abstraction.
//!
//! The [`ArtifactCache`] trait is the boundary between a generation session
//! and wherever finished artifacts are kept. It holds at most one
//! [`CachedArtifact`] per (owner, repo); writes are last-writer-wins.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::CachedArtifact;

/// Keyed store of the last successful generation.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](ArtifactCache::get) | Fetch the artifact for a key |
/// | [`put`](ArtifactCache::put) | Insert or overwrite the artifact for a key |
/// | [`last_generated_at`](ArtifactCache::last_generated_at) | When the key was last written |
/// | [`cached_diagram`](ArtifactCache::cached_diagram) | Diagram text only |
/// | [`cached_explanation`](ArtifactCache::cached_explanation) | Explanation text only |
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    async fn get(&self, owner: &str, repo: &str) -> Result<Option<CachedArtifact>>;

    /// Overwrites any existing entry. `created_at` of an existing entry is
    /// kept; `updated_at` moves to now.
    async fn put(&self, owner: &str, repo: &str, diagram: &str, explanation: &str) -> Result<()>;

    async fn last_generated_at(&self, owner: &str, repo: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.get(owner, repo).await?.map(|a| a.updated_at))
    }

    async fn cached_diagram(&self, owner: &str, repo: &str) -> Result<Option<String>> {
        Ok(self.get(owner, repo).await?.map(|a| a.diagram))
    }

    async fn cached_explanation(&self, owner: &str, repo: &str) -> Result<Option<String>> {
        Ok(self.get(owner, repo).await?.map(|a| a.explanation))
    }
}
