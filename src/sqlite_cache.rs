//! SQLite-backed [`ArtifactCache`] implementation.
//!
//! Maps each cache operation onto the `diagram_cache` table created by
//! [`migrate`](crate::migrate). Writes upsert on the `(username, repo)`
//! primary key.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use diagram_stream_core::cache::ArtifactCache;
use diagram_stream_core::models::CachedArtifact;

pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

#[async_trait]
impl ArtifactCache for SqliteCache {
    async fn get(&self, owner: &str, repo: &str) -> Result<Option<CachedArtifact>> {
        let row = sqlx::query(
            "SELECT username, repo, diagram, explanation, created_at, updated_at FROM diagram_cache WHERE username = ? AND repo = ?",
        )
        .bind(owner)
        .bind(repo)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| CachedArtifact {
            owner: row.get("username"),
            repo: row.get("repo"),
            diagram: row.get("diagram"),
            explanation: row.get("explanation"),
            created_at: from_ts(row.get("created_at")),
            updated_at: from_ts(row.get("updated_at")),
        }))
    }

    async fn put(&self, owner: &str, repo: &str, diagram: &str, explanation: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO diagram_cache (username, repo, diagram, explanation, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(username, repo) DO UPDATE SET
                diagram = excluded.diagram,
                explanation = excluded.explanation,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(owner)
        .bind(repo)
        .bind(diagram)
        .bind(explanation)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn last_generated_at(&self, owner: &str, repo: &str) -> Result<Option<DateTime<Utc>>> {
        let ts: Option<i64> = sqlx::query_scalar(
            "SELECT updated_at FROM diagram_cache WHERE username = ? AND repo = ?",
        )
        .bind(owner)
        .bind(repo)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ts.map(from_ts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_cache() -> SqliteCache {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        SqliteCache::new(pool)
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_key() {
        let cache = memory_cache().await;
        assert!(cache.get("octo", "demo").await.unwrap().is_none());

        cache.put("octo", "demo", "graph A", "first").await.unwrap();
        let first = cache.get("octo", "demo").await.unwrap().unwrap();
        cache.put("octo", "demo", "graph B", "second").await.unwrap();
        let second = cache.get("octo", "demo").await.unwrap().unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM diagram_cache")
            .fetch_one(cache.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(second.diagram, "graph B");
        assert_eq!(second.explanation, "second");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn boundary_helpers_read_through() {
        let cache = memory_cache().await;
        assert_eq!(cache.last_generated_at("octo", "demo").await.unwrap(), None);

        cache.put("octo", "demo", "graph TD", "why").await.unwrap();
        assert_eq!(
            cache.cached_diagram("octo", "demo").await.unwrap().as_deref(),
            Some("graph TD")
        );
        assert_eq!(
            cache.cached_explanation("octo", "demo").await.unwrap().as_deref(),
            Some("why")
        );
        assert!(cache.last_generated_at("octo", "demo").await.unwrap().is_some());
        assert_eq!(cache.cached_diagram("octo", "other").await.unwrap(), None);
    }
}
