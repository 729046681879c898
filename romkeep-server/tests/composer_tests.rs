//! Integration tests for on-demand archive composition against a real
//! catalog: parent variant lookup and firmware merging.

use romkeep_common::config::TomlConfig;
use romkeep_server::config::PlatformTable;
use romkeep_server::db::{self, entries::CatalogEntry};
use romkeep_server::services::composer::{write_archive, ArchiveComposer, ComposeError};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use tempfile::TempDir;
use zip::ZipArchive;

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    db::create_tables(&pool).await.expect("Failed to create schema");
    pool
}

fn read_entries(bytes: &[u8]) -> HashMap<String, Vec<u8>> {
    let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = HashMap::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        out.insert(entry.name().to_string(), data);
    }
    out
}

/// neogeo partition: a child variant, its parent, and the firmware
/// archive the builtin platform table declares for neogeo
async fn neogeo_fixture(pool: &SqlitePool) -> TempDir {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("neogeo");
    std::fs::create_dir_all(&dir).unwrap();

    write_archive(
        &dir.join("mslug2 (alt).zip"),
        &[
            ("game.rom", b"child-code".as_slice()),
            ("shared.bin", b"child-tables".as_slice()),
        ],
    )
    .unwrap();
    write_archive(
        &dir.join("mslug2.zip"),
        &[
            ("shared.bin", b"parent-tables".as_slice()),
            ("extra.rom", b"parent-only".as_slice()),
        ],
    )
    .unwrap();
    write_archive(&dir.join("neogeo.zip"), &[("bios.rom", b"bios".as_slice())]).unwrap();

    for filename in ["mslug2 (alt).zip", "mslug2.zip"] {
        let entry = CatalogEntry::new("neogeo", filename, "Metal Slug 2");
        db::entries::replace_entry(pool, &entry).await.unwrap();
    }

    root
}

fn composer_for(pool: &SqlitePool, root: &TempDir) -> ArchiveComposer {
    let platforms = PlatformTable::load(&TomlConfig::default());
    ArchiveComposer::new(pool.clone(), platforms, root.path())
}

#[tokio::test]
async fn test_compose_merges_parent_and_firmware() {
    let pool = memory_pool().await;
    let root = neogeo_fixture(&pool).await;
    let composer = composer_for(&pool, &root);

    let entry = db::entries::load_by_path(&pool, "neogeo/mslug2 (alt).zip")
        .await
        .unwrap()
        .unwrap();
    let bytes = composer.compose(&entry).await.unwrap();
    let contents = read_entries(&bytes);

    assert_eq!(contents.len(), 4);
    assert_eq!(contents["game.rom"], b"child-code");
    // Base archive wins name collisions against the parent
    assert_eq!(contents["shared.bin"], b"child-tables");
    assert_eq!(contents["extra.rom"], b"parent-only");
    assert_eq!(contents["bios.rom"], b"bios");
}

#[tokio::test]
async fn test_compose_parent_does_not_merge_itself() {
    let pool = memory_pool().await;
    let root = neogeo_fixture(&pool).await;
    let composer = composer_for(&pool, &root);

    // The parent is its own shortest-named variant
    let entry = db::entries::load_by_path(&pool, "neogeo/mslug2.zip")
        .await
        .unwrap()
        .unwrap();
    let bytes = composer.compose(&entry).await.unwrap();
    let contents = read_entries(&bytes);

    assert_eq!(contents.len(), 3);
    assert_eq!(contents["shared.bin"], b"parent-tables");
    assert!(contents.contains_key("bios.rom"));
}

#[tokio::test]
async fn test_compose_missing_firmware_skipped() {
    let pool = memory_pool().await;
    let root = neogeo_fixture(&pool).await;
    std::fs::remove_file(root.path().join("neogeo").join("neogeo.zip")).unwrap();
    let composer = composer_for(&pool, &root);

    let entry = db::entries::load_by_path(&pool, "neogeo/mslug2 (alt).zip")
        .await
        .unwrap()
        .unwrap();
    let bytes = composer.compose(&entry).await.unwrap();
    let contents = read_entries(&bytes);

    assert!(contents.contains_key("game.rom"));
    assert!(contents.contains_key("extra.rom"));
    assert!(!contents.contains_key("bios.rom"));
}

#[tokio::test]
async fn test_compose_missing_base_is_fatal() {
    let pool = memory_pool().await;
    let root = neogeo_fixture(&pool).await;
    let composer = composer_for(&pool, &root);

    let entry = CatalogEntry::new("neogeo", "ghost.zip", "Ghost Game");
    let result = composer.compose(&entry).await;

    assert!(matches!(result, Err(ComposeError::NotFound(_))));
}
