//! Media dedup cache: URL → relative local path.
//!
//! Append-only under normal operation. An entry whose target file was
//! deleted outside the cache's knowledge degrades to a miss at the
//! fetcher, never an error.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

/// Look up a previously materialized local copy for a source URL
pub async fn lookup(pool: &SqlitePool, url: &str) -> Result<Option<String>> {
    let row = sqlx::query("SELECT local_path FROM media_cache WHERE url = ?")
        .bind(url)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get("local_path")))
}

/// Register a materialized download. Upsert: a racing duplicate download
/// merely rewrites the same mapping.
pub async fn register(pool: &SqlitePool, url: &str, local_path: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO media_cache (url, local_path)
        VALUES (?, ?)
        ON CONFLICT(url) DO UPDATE SET local_path = excluded.local_path
        "#,
    )
    .bind(url)
    .bind(local_path)
    .execute(pool)
    .await?;

    Ok(())
}
