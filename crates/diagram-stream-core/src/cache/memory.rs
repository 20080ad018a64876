//! In-memory [`ArtifactCache`] for tests and embedding.
//!
//! A `HashMap` behind `std::sync::RwLock`.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::CachedArtifact;

use super::ArtifactCache;

pub struct InMemoryCache {
    entries: RwLock<HashMap<(String, String), CachedArtifact>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactCache for InMemoryCache {
    async fn get(&self, owner: &str, repo: &str) -> Result<Option<CachedArtifact>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("artifact cache lock poisoned"))?;
        Ok(entries
            .get(&(owner.to_string(), repo.to_string()))
            .cloned())
    }

    async fn put(&self, owner: &str, repo: &str, diagram: &str, explanation: &str) -> Result<()> {
        let now = Utc::now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("artifact cache lock poisoned"))?;
        let key = (owner.to_string(), repo.to_string());
        let created_at = entries.get(&key).map(|a| a.created_at).unwrap_or(now);
        entries.insert(
            key,
            CachedArtifact {
                owner: owner.to_string(),
                repo: repo.to_string(),
                diagram: diagram.to_string(),
                explanation: explanation.to_string(),
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }
}
