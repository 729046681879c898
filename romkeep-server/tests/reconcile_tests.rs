//! Integration tests for the reconciliation pass: disk vs catalog
//! add/update/delete planning and transactional delete application.

use romkeep_server::db::{self, entries::CatalogEntry};
use romkeep_server::services::reconciler;
use romkeep_server::services::scanner::RomScanner;
use romkeep_server::types::SyncOptions;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::time::Duration;
use tempfile::TempDir;

async fn memory_pool() -> SqlitePool {
    // Single connection: each :memory: connection is a separate database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    db::create_tables(&pool).await.expect("Failed to create schema");
    pool
}

/// Library root with an `nes` partition holding two ROMs
fn nes_fixture() -> TempDir {
    let root = TempDir::new().unwrap();
    let nes = root.path().join("nes");
    std::fs::create_dir_all(&nes).unwrap();
    std::fs::write(nes.join("Super Mario Bros (USA).zip"), b"mario").unwrap();
    std::fs::write(nes.join("Zelda II (USA).zip"), b"zelda").unwrap();
    root
}

fn scanner_for(root: &TempDir) -> RomScanner {
    // Zero TTL: listings must reflect mid-test filesystem changes
    RomScanner::with_ttl(root.path(), Duration::ZERO)
}

fn info_only() -> SyncOptions {
    SyncOptions {
        sync_info: true,
        sync_images: false,
        sync_video: false,
        sync_marquees: false,
        sync_box_art: false,
        incremental: true,
        overwrite: false,
    }
}

fn complete_entry(system: &str, filename: &str, title: &str) -> CatalogEntry {
    let mut entry = CatalogEntry::new(system, filename, title);
    entry.synopsis = Some("A game about a plumber.".to_string());
    entry
}

#[tokio::test]
async fn test_first_pass_adds_everything() {
    let root = nes_fixture();
    let pool = memory_pool().await;
    let scanner = scanner_for(&root);

    let plan = reconciler::reconcile(&pool, &scanner, "nes", &info_only(), None)
        .await
        .unwrap();

    assert_eq!(plan.to_add.len(), 2);
    assert!(plan.to_update.is_empty());
    assert!(plan.to_delete.is_empty());
    assert!(plan.to_add.contains(&"Super Mario Bros (USA).zip".to_string()));
    assert!(plan.to_add.contains(&"Zelda II (USA).zip".to_string()));
}

#[tokio::test]
async fn test_complete_entries_skipped_incrementally() {
    let root = nes_fixture();
    let pool = memory_pool().await;
    let scanner = scanner_for(&root);

    for filename in ["Super Mario Bros (USA).zip", "Zelda II (USA).zip"] {
        let entry = complete_entry("nes", filename, "Title");
        db::entries::replace_entry(&pool, &entry).await.unwrap();
    }

    let plan = reconciler::reconcile(&pool, &scanner, "nes", &info_only(), None)
        .await
        .unwrap();

    assert!(plan.is_empty(), "expected no work, got {:?}", plan);
}

#[tokio::test]
async fn test_non_incremental_revisits_complete_entries() {
    let root = nes_fixture();
    let pool = memory_pool().await;
    let scanner = scanner_for(&root);

    for filename in ["Super Mario Bros (USA).zip", "Zelda II (USA).zip"] {
        let entry = complete_entry("nes", filename, "Title");
        db::entries::replace_entry(&pool, &entry).await.unwrap();
    }

    let mut options = info_only();
    options.incremental = false;

    let plan = reconciler::reconcile(&pool, &scanner, "nes", &options, None)
        .await
        .unwrap();

    assert_eq!(plan.to_update.len(), 2);
    assert!(plan.to_add.is_empty());
    assert!(plan.to_delete.is_empty());
}

#[tokio::test]
async fn test_placeholder_synopsis_counts_as_incomplete() {
    let root = nes_fixture();
    let pool = memory_pool().await;
    let scanner = scanner_for(&root);

    let mut entry = CatalogEntry::new("nes", "Super Mario Bros (USA).zip", "Super Mario Bros");
    entry.synopsis = Some(db::entries::PLACEHOLDER_SYNOPSIS.to_string());
    db::entries::replace_entry(&pool, &entry).await.unwrap();

    let plan = reconciler::reconcile(&pool, &scanner, "nes", &info_only(), None)
        .await
        .unwrap();

    assert!(plan
        .to_update
        .contains(&"Super Mario Bros (USA).zip".to_string()));
}

#[tokio::test]
async fn test_vanished_files_deleted_from_catalog() {
    let root = nes_fixture();
    let pool = memory_pool().await;
    let scanner = scanner_for(&root);

    let entry = complete_entry("nes", "Metroid (USA).zip", "Metroid");
    db::entries::replace_entry(&pool, &entry).await.unwrap();

    let plan = reconciler::reconcile(&pool, &scanner, "nes", &info_only(), None)
        .await
        .unwrap();

    assert_eq!(plan.to_delete, vec!["nes/Metroid (USA).zip".to_string()]);

    reconciler::apply_deletes(&pool, &plan).await.unwrap();
    let rows = db::entries::load_for_system(&pool, "nes").await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_only_filter_never_deletes_others() {
    let root = nes_fixture();
    let pool = memory_pool().await;
    let scanner = scanner_for(&root);

    // Catalog row for a file that no longer exists would normally be
    // deleted, but a single-item pass must not touch it
    let stale = complete_entry("nes", "Metroid (USA).zip", "Metroid");
    db::entries::replace_entry(&pool, &stale).await.unwrap();

    let plan = reconciler::reconcile(
        &pool,
        &scanner,
        "nes",
        &info_only(),
        Some("Super Mario Bros (USA).zip"),
    )
    .await
    .unwrap();

    assert!(plan.to_delete.is_empty());
    assert_eq!(plan.to_add, vec!["Super Mario Bros (USA).zip".to_string()]);
}

#[tokio::test]
async fn test_second_pass_after_file_removed() {
    let root = nes_fixture();
    let pool = memory_pool().await;
    let scanner = scanner_for(&root);

    for filename in ["Super Mario Bros (USA).zip", "Zelda II (USA).zip"] {
        let entry = complete_entry("nes", filename, "Title");
        db::entries::replace_entry(&pool, &entry).await.unwrap();
    }

    std::fs::remove_file(root.path().join("nes").join("Zelda II (USA).zip")).unwrap();

    let plan = reconciler::reconcile(&pool, &scanner, "nes", &info_only(), None)
        .await
        .unwrap();

    assert_eq!(plan.to_delete, vec!["nes/Zelda II (USA).zip".to_string()]);
    assert!(plan.to_add.is_empty());
}
