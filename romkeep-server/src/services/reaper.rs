//! Orphan reaper: post-sync garbage collector for unreferenced assets.
//!
//! Recomputes the asset paths referenced by any catalog row in a
//! partition and deletes every file in the partition's asset
//! sub-directories that is not in that set. Runs at the end of each
//! batch sync and after each single-item forced refresh.

use crate::db::entries;
use crate::services::media::MediaCategory;
use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;

/// Sweep statistics
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub removed: usize,
    pub kept: usize,
    pub errors: usize,
}

/// Delete unreferenced files from a partition's asset directories.
///
/// Per-file deletion errors are logged and do not abort the sweep.
pub async fn sweep(db: &SqlitePool, root: &Path, system: &str) -> Result<SweepStats> {
    let rows = entries::load_for_system(db, system).await?;

    let referenced: HashSet<String> = rows
        .iter()
        .flat_map(|row| row.asset_paths().map(str::to_string))
        .collect();

    let mut stats = SweepStats::default();

    for category in MediaCategory::all() {
        let dir = root.join(system).join("media").join(category.dir());
        if !dir.is_dir() {
            continue;
        }

        let iter = match std::fs::read_dir(&dir) {
            Ok(iter) => iter,
            Err(e) => {
                tracing::warn!(system, dir = %dir.display(), error = %e, "Cannot read asset directory");
                stats.errors += 1;
                continue;
            }
        };

        for dir_entry in iter.flatten() {
            if !dir_entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().to_string();
            let relative = format!("{}/media/{}/{}", system, category.dir(), name);

            if referenced.contains(&relative) {
                stats.kept += 1;
                continue;
            }

            match std::fs::remove_file(dir_entry.path()) {
                Ok(()) => {
                    tracing::debug!(system, asset = %relative, "Removed orphaned asset");
                    stats.removed += 1;
                }
                Err(e) => {
                    tracing::warn!(system, asset = %relative, error = %e, "Failed to remove orphan");
                    stats.errors += 1;
                }
            }
        }
    }

    tracing::info!(
        system,
        removed = stats.removed,
        kept = stats.kept,
        "Orphan sweep complete"
    );

    Ok(stats)
}
