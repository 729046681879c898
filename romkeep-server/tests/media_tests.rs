//! Integration tests for media fetching paths that need no live
//! remote: idempotent skips, dedup cache hits and failure cleanup.
//! Download attempts point at an unbound local port.

use romkeep_server::db::{self, media_cache};
use romkeep_server::services::media::{MediaCategory, MediaFetcher};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;

const DEAD_URL: &str = "http://127.0.0.1:9/covers/mario.png";

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    db::create_tables(&pool).await.expect("Failed to create schema");
    pool
}

fn seed_asset(root: &TempDir, relative: &str, contents: &[u8]) {
    let path = root.path().join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[tokio::test]
async fn test_existing_asset_skipped_without_download() {
    let root = TempDir::new().unwrap();
    let pool = memory_pool().await;
    let fetcher = MediaFetcher::new(root.path(), pool);

    seed_asset(&root, "nes/media/images/Super Mario Bros.png", b"existing");

    // The URL is unreachable; success proves no request was made
    let relative = fetcher
        .ensure_local(DEAD_URL, "nes", MediaCategory::Image, "Super Mario Bros", false)
        .await
        .unwrap();

    assert_eq!(relative, "nes/media/images/Super Mario Bros.png");
    let contents = std::fs::read(root.path().join(&relative)).unwrap();
    assert_eq!(contents, b"existing");
}

#[tokio::test]
async fn test_dedup_cache_hit_links_existing_copy() {
    let root = TempDir::new().unwrap();
    let pool = memory_pool().await;
    let fetcher = MediaFetcher::new(root.path(), pool.clone());

    seed_asset(&root, "nes/media/images/Super Mario Bros.png", b"shared-bytes");
    media_cache::register(&pool, DEAD_URL, "nes/media/images/Super Mario Bros.png")
        .await
        .unwrap();

    // Same URL, different stem: served from the cached copy on disk
    let relative = fetcher
        .ensure_local(DEAD_URL, "nes", MediaCategory::Image, "Mario Bros Duo", false)
        .await
        .unwrap();

    assert_eq!(relative, "nes/media/images/Mario Bros Duo.png");
    let contents = std::fs::read(root.path().join(&relative)).unwrap();
    assert_eq!(contents, b"shared-bytes");
}

#[tokio::test]
async fn test_stale_cache_row_falls_through_to_download() {
    let root = TempDir::new().unwrap();
    let pool = memory_pool().await;
    let fetcher = MediaFetcher::new(root.path(), pool.clone());

    // Cache points at a file that no longer exists
    media_cache::register(&pool, DEAD_URL, "nes/media/images/Gone.png")
        .await
        .unwrap();

    let result = fetcher
        .ensure_local(DEAD_URL, "nes", MediaCategory::Image, "Mario", false)
        .await;

    assert!(result.is_err());
    assert!(!root.path().join("nes/media/images/Mario.png").exists());
}

#[tokio::test]
async fn test_failed_download_leaves_no_partial_file() {
    let root = TempDir::new().unwrap();
    let pool = memory_pool().await;
    let fetcher = MediaFetcher::new(root.path(), pool);

    let result = fetcher
        .ensure_local(DEAD_URL, "nes", MediaCategory::Image, "Mario", false)
        .await;

    assert!(result.is_err());
    assert!(!root.path().join("nes/media/images/Mario.png").exists());
}

#[tokio::test]
async fn test_overwrite_removes_existing_before_fetch() {
    let root = TempDir::new().unwrap();
    let pool = memory_pool().await;
    let fetcher = MediaFetcher::new(root.path(), pool);

    seed_asset(&root, "nes/media/images/Mario.png", b"old");

    // Overwrite deletes eagerly; the failed re-download leaves nothing
    let result = fetcher
        .ensure_local(DEAD_URL, "nes", MediaCategory::Image, "Mario", true)
        .await;

    assert!(result.is_err());
    assert!(!root.path().join("nes/media/images/Mario.png").exists());
}
