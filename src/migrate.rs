use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the cache schema on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per (username, repo); timestamps are Unix seconds.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS diagram_cache (
            username TEXT NOT NULL,
            repo TEXT NOT NULL,
            diagram TEXT NOT NULL,
            explanation TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (username, repo)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_diagram_cache_updated_at ON diagram_cache(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
