//! Catalog entry persistence.
//!
//! One row per physical ROM file, keyed by the unique relative path
//! `system/filename`. Rows are mutated via full delete+reinsert, never
//! partial update; removals happen as one transactional batch.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// Synopsis written when the lookup service had no match; the
/// incremental completeness test treats it as missing data.
pub const PLACEHOLDER_SYNOPSIS: &str = "No description available.";

/// One cataloged ROM file and its associated metadata/asset paths.
///
/// Multiple entries may share `(system, title)`: regional or revision
/// variants of the same game. Asset path fields are relative to the
/// library root.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub path: String,
    pub system: String,
    pub filename: String,
    pub title: String,
    pub image: Option<String>,
    pub video: Option<String>,
    pub marquee: Option<String>,
    pub box_texture: Option<String>,
    pub screenshot: Option<String>,
    pub synopsis: Option<String>,
    pub rating: Option<String>,
    pub released: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    pub players: Option<String>,
}

impl CatalogEntry {
    /// Create a bare record for a newly observed file
    pub fn new(system: &str, filename: &str, title: &str) -> Self {
        Self {
            path: entry_path(system, filename),
            system: system.to_string(),
            filename: filename.to_string(),
            title: title.to_string(),
            image: None,
            video: None,
            marquee: None,
            box_texture: None,
            screenshot: None,
            synopsis: None,
            rating: None,
            released: None,
            developer: None,
            publisher: None,
            genre: None,
            players: None,
        }
    }

    /// Asset path fields across all tracked categories
    pub fn asset_paths(&self) -> impl Iterator<Item = &str> {
        [
            self.image.as_deref(),
            self.video.as_deref(),
            self.marquee.as_deref(),
            self.box_texture.as_deref(),
            self.screenshot.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

/// Primary key for a file within a system partition
pub fn entry_path(system: &str, filename: &str) -> String {
    format!("{}/{}", system, filename)
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> CatalogEntry {
    CatalogEntry {
        path: row.get("path"),
        system: row.get("system"),
        filename: row.get("filename"),
        title: row.get("title"),
        image: row.get("image"),
        video: row.get("video"),
        marquee: row.get("marquee"),
        box_texture: row.get("box_texture"),
        screenshot: row.get("screenshot"),
        synopsis: row.get("synopsis"),
        rating: row.get("rating"),
        released: row.get("released"),
        developer: row.get("developer"),
        publisher: row.get("publisher"),
        genre: row.get("genre"),
        players: row.get("players"),
    }
}

const SELECT_COLUMNS: &str = "path, system, filename, title, image, video, marquee, \
     box_texture, screenshot, synopsis, rating, released, developer, publisher, genre, players";

/// Load entry by primary key
pub async fn load_by_path(pool: &SqlitePool, path: &str) -> Result<Option<CatalogEntry>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM entries WHERE path = ?",
        SELECT_COLUMNS
    ))
    .bind(path)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(row_to_entry))
}

/// Load all entries for one system partition, ordered by filename
pub async fn load_for_system(pool: &SqlitePool, system: &str) -> Result<Vec<CatalogEntry>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM entries WHERE system = ? ORDER BY filename",
        SELECT_COLUMNS
    ))
    .bind(system)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_entry).collect())
}

/// Replace an entry: transactional delete + insert (never partial update)
pub async fn replace_entry(pool: &SqlitePool, entry: &CatalogEntry) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM entries WHERE path = ?")
        .bind(&entry.path)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO entries (
            path, system, filename, title, image, video, marquee, box_texture,
            screenshot, synopsis, rating, released, developer, publisher, genre, players,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(&entry.path)
    .bind(&entry.system)
    .bind(&entry.filename)
    .bind(&entry.title)
    .bind(&entry.image)
    .bind(&entry.video)
    .bind(&entry.marquee)
    .bind(&entry.box_texture)
    .bind(&entry.screenshot)
    .bind(&entry.synopsis)
    .bind(&entry.rating)
    .bind(&entry.released)
    .bind(&entry.developer)
    .bind(&entry.publisher)
    .bind(&entry.genre)
    .bind(&entry.players)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(())
}

/// Delete a set of entries in one transaction
pub async fn delete_batch(pool: &SqlitePool, paths: &[String]) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    for path in paths {
        sqlx::query("DELETE FROM entries WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(())
}

/// Resolve the "parent" variant for a logical title: the entry sharing
/// `(system, title)` with the shortest filename. Equal lengths tie-break
/// by lexicographic ascending filename so the choice is deterministic.
pub async fn find_parent(
    pool: &SqlitePool,
    system: &str,
    title: &str,
) -> Result<Option<CatalogEntry>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM entries WHERE system = ? AND title = ? \
         ORDER BY LENGTH(filename), filename LIMIT 1",
        SELECT_COLUMNS
    ))
    .bind(system)
    .bind(title)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(row_to_entry))
}

/// Grouped aggregate: `(system, entry count)` pairs, ordered by system
pub async fn list_systems_with_counts(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        "SELECT system, COUNT(*) AS entry_count FROM entries GROUP BY system ORDER BY system",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("system"), row.get("entry_count")))
        .collect())
}
