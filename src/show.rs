//! Cached artifact retrieval.
//!
//! Reads the last generated diagram for an (owner, repo) pair straight from
//! the cache. Used by `dgs show`; `--diagram-only` prints just the Mermaid
//! source so it can be piped or copied.

use anyhow::{bail, Result};
use serde::Serialize;

use diagram_stream_core::cache::ArtifactCache;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_cache::SqliteCache;

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactResponse {
    pub owner: String,
    pub repo: String,
    pub diagram: String,
    pub explanation: String,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
}

/// Look up the cached artifact; `None` when nothing has been generated yet.
pub async fn get_artifact(
    config: &Config,
    owner: &str,
    repo: &str,
) -> Result<Option<ArtifactResponse>> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let cache = SqliteCache::new(pool.clone());

    let artifact = cache.get(owner, repo).await?;
    pool.close().await;

    Ok(artifact.map(|a| ArtifactResponse {
        owner: a.owner,
        repo: a.repo,
        diagram: a.diagram,
        explanation: a.explanation,
        created_at: a.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        updated_at: a.updated_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    }))
}

/// CLI entry point: print the cached artifact to stdout.
pub async fn run_show(config: &Config, owner: &str, repo: &str, diagram_only: bool) -> Result<()> {
    let artifact = match get_artifact(config, owner, repo).await? {
        Some(a) => a,
        None => bail!("no cached diagram for {}/{}", owner, repo),
    };

    if diagram_only {
        println!("{}", artifact.diagram);
        return Ok(());
    }

    println!("--- Diagram ---");
    println!("repo:           {}/{}", artifact.owner, artifact.repo);
    println!("created_at:     {}", artifact.created_at);
    println!("last_generated: {}", artifact.updated_at);
    println!();

    println!("--- Explanation ---");
    println!("{}", artifact.explanation);
    println!();

    println!("--- Mermaid ---");
    println!("{}", artifact.diagram);

    Ok(())
}
