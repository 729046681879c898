//! Reconciliation engine.
//!
//! Diffs on-disk inventory against the persisted catalog for one system
//! partition and produces the add/update/delete sets driving a sync
//! batch. Deleted rows are removed here in one transaction; their asset
//! files are left alone - cleanup belongs to the orphan reaper at batch
//! end, because a hard-linked asset may back several rows.

use crate::db::entries::{self, CatalogEntry, PLACEHOLDER_SYNOPSIS};
use crate::services::scanner::RomScanner;
use crate::types::SyncOptions;
use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;

/// Result of a reconciliation pass
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// On-disk filenames with no catalog row
    pub to_add: Vec<String>,
    /// Cataloged filenames whose record is deemed incomplete
    pub to_update: Vec<String>,
    /// Catalog paths whose backing file disappeared from disk
    pub to_delete: Vec<String>,
}

impl ReconcilePlan {
    /// Deduplicated union of `to_add` and `to_update`, adds first
    pub fn work_list(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.to_add
            .iter()
            .chain(self.to_update.iter())
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Compute the add/update/delete sets for one partition.
///
/// `only` restricts the pass to a single filename (the single-item
/// refresh path); rows for other files are never scheduled for
/// deletion in that mode.
pub async fn reconcile(
    db: &SqlitePool,
    scanner: &RomScanner,
    system: &str,
    options: &SyncOptions,
    only: Option<&str>,
) -> Result<ReconcilePlan> {
    let root = scanner.root();
    let disk_files = scanner.list_roms(system)?;
    let mut rows = entries::load_for_system(db, system).await?;

    let disk_files: Vec<String> = match only {
        Some(filename) => {
            rows.retain(|row| row.filename == filename);
            disk_files
                .iter()
                .filter(|name| name.as_str() == filename)
                .cloned()
                .collect()
        }
        None => disk_files.to_vec(),
    };

    let disk_set: HashSet<&str> = disk_files.iter().map(String::as_str).collect();
    let row_names: HashSet<&str> = rows.iter().map(|r| r.filename.as_str()).collect();

    let mut plan = ReconcilePlan::default();

    for name in &disk_files {
        if !row_names.contains(name.as_str()) {
            plan.to_add.push(name.clone());
        }
    }

    for row in &rows {
        if !disk_set.contains(row.filename.as_str()) {
            plan.to_delete.push(row.path.clone());
        } else if !options.incremental || !entry_is_complete(row, options, root) {
            plan.to_update.push(row.filename.clone());
        }
    }

    tracing::debug!(
        system,
        add = plan.to_add.len(),
        update = plan.to_update.len(),
        delete = plan.to_delete.len(),
        "Reconciliation computed"
    );

    Ok(plan)
}

/// Remove the `to_delete` rows in one transaction. Asset files are not
/// touched here.
pub async fn apply_deletes(db: &SqlitePool, plan: &ReconcilePlan) -> Result<()> {
    entries::delete_batch(db, &plan.to_delete).await
}

/// A record is complete when every requested category's backing asset
/// file exists non-empty and the synopsis is past the placeholder.
fn entry_is_complete(entry: &CatalogEntry, options: &SyncOptions, root: &Path) -> bool {
    if options.sync_info {
        match entry.synopsis.as_deref() {
            None => return false,
            Some(text) if text.is_empty() || text == PLACEHOLDER_SYNOPSIS => return false,
            Some(_) => {}
        }
    }

    let requested: [(bool, &Option<String>); 5] = [
        (options.sync_images, &entry.image),
        (options.sync_images, &entry.screenshot),
        (options.sync_video, &entry.video),
        (options.sync_marquees, &entry.marquee),
        (options.sync_box_art, &entry.box_texture),
    ];

    for (wanted, asset) in requested {
        if !wanted {
            continue;
        }
        match asset {
            None => return false,
            Some(relative) => {
                let backing = root.join(relative);
                let nonempty = std::fs::metadata(&backing)
                    .map(|m| m.len() > 0)
                    .unwrap_or(false);
                if !nonempty {
                    return false;
                }
            }
        }
    }

    true
}
