//! `dgs generate`, `dgs regenerate`, `dgs modify` and `dgs cost`.
//!
//! Wires the configured [`HttpBackend`] and [`SqliteCache`] into a
//! [`SessionController`], runs one session and prints the result. The
//! diagram goes to stdout; progress goes to stderr through the selected
//! reporter.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use diagram_stream_core::models::GenerationRequest;

use crate::backend::GenerationBackend;
use crate::client::HttpBackend;
use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::progress::SessionReporter;
use crate::session::{Outcome, SessionController, SessionSettings, SessionSnapshot};
use crate::sqlite_cache::SqliteCache;

/// Which controller operation to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start(Option<String>),
    Regenerate(String),
    Modify(String),
}

/// Run one session against the configured backend and cache.
///
/// Returns the final snapshot; a session that ends in error is an `Err`
/// carrying the user-facing message.
pub async fn generate(
    config: &Config,
    owner: &str,
    repo: &str,
    action: Action,
    reporter: Arc<dyn SessionReporter>,
) -> Result<SessionSnapshot> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let backend = HttpBackend::new(&config.backend).context("Failed to build HTTP client")?;
    let controller = SessionController::new(
        owner,
        repo,
        Arc::new(backend),
        Arc::new(SqliteCache::new(pool.clone())),
        SessionSettings::from_config(config),
    )
    .with_reporter(reporter);

    let outcome = match &action {
        Action::Start(instructions) => controller.start(instructions.as_deref()).await,
        Action::Regenerate(instructions) => controller.regenerate(instructions).await,
        Action::Modify(instructions) => controller.modify(instructions).await,
    };
    pool.close().await;

    match outcome {
        Outcome::Finished(snapshot) if snapshot.is_error() => {
            bail!("{}", snapshot.error.as_deref().unwrap_or("Generation failed"))
        }
        Outcome::Finished(snapshot) => Ok(snapshot),
        Outcome::Superseded => bail!("generation for {}/{} was superseded", owner, repo),
    }
}

/// CLI entry point: run the session and print the diagram (or the whole
/// snapshot as JSON).
pub async fn run_generate(
    config: &Config,
    owner: &str,
    repo: &str,
    action: Action,
    reporter: Arc<dyn SessionReporter>,
    json: bool,
) -> Result<()> {
    let snapshot = generate(config, owner, repo, action, reporter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("{}", snapshot.diagram);
    if let Some(cost) = &snapshot.cost {
        eprintln!("estimated cost: {}", cost);
    }
    if let Some(last) = snapshot.last_generated {
        eprintln!("last generated: {}", last.format("%Y-%m-%dT%H:%M:%SZ"));
    }
    Ok(())
}

/// `dgs cost`: ask the backend for an estimate without generating anything.
pub async fn run_cost(config: &Config, owner: &str, repo: &str) -> Result<()> {
    let backend = HttpBackend::new(&config.backend).context("Failed to build HTTP client")?;
    let request = GenerationRequest {
        username: owner.to_string(),
        repo: repo.to_string(),
        github_access_token: config.backend.github_token(),
        instructions: String::new(),
    };

    match backend.estimate_cost(&request).await {
        Ok(Some(cost)) => println!("{}", cost),
        Ok(None) => println!("(no estimate returned)"),
        Err(e) => bail!("{}", e.user_message()),
    }
    Ok(())
}
