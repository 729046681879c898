//! On-demand archive composer.
//!
//! Arcade ROM sets ship as parent/clone archives: a clone omits assets
//! shared with its parent, and some platforms additionally require a
//! firmware archive at load time. For systems whose core expects merged
//! sets, the composer merges the requested archive, its parent variant,
//! and the platform firmware into one in-memory ZIP. Base entries take
//! precedence on name collision; parent and firmware merge failures
//! degrade gracefully to a package missing only the shared assets.

use crate::config::PlatformTable;
use crate::db::entries::{self, CatalogEntry};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

/// Archive composer errors
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Base archive missing on disk
    #[error("Base archive not found: {0}")]
    NotFound(PathBuf),

    /// Base archive unreadable or corrupt - fatal for the request
    #[error("Archive error in {0}: {1}")]
    Archive(PathBuf, String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Compose task failed: {0}")]
    Task(String),
}

/// Composes merged archives for arcade entries
pub struct ArchiveComposer {
    db: SqlitePool,
    platforms: Arc<PlatformTable>,
    root: PathBuf,
}

impl ArchiveComposer {
    pub fn new(db: SqlitePool, platforms: Arc<PlatformTable>, root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            platforms,
            root: root.into(),
        }
    }

    /// Compose the deliverable package for one catalog entry.
    ///
    /// The caller is responsible for only invoking this on systems where
    /// [`PlatformTable::uses_merged_archives`] holds; other systems
    /// stream the raw backing file.
    pub async fn compose(&self, entry: &CatalogEntry) -> Result<Vec<u8>, ComposeError> {
        let base = self.root.join(&entry.system).join(&entry.filename);

        let mut extras: Vec<PathBuf> = Vec::new();

        // Parent variant: the shortest-named entry sharing (system, title)
        match entries::find_parent(&self.db, &entry.system, &entry.title).await {
            Ok(Some(parent)) if parent.path != entry.path => {
                extras.push(self.root.join(&parent.system).join(&parent.filename));
            }
            Ok(_) => {}
            Err(e) => return Err(ComposeError::Catalog(e.to_string())),
        }

        // Platform firmware archive, when the static config declares one
        if let Some(firmware) = self.platforms.firmware(&entry.system) {
            extras.push(self.root.join(&entry.system).join(firmware));
        }

        tokio::task::spawn_blocking(move || merge_archives(&base, &extras))
            .await
            .map_err(|e| ComposeError::Task(e.to_string()))?
    }
}

/// Merge `extras` into the archive at `base`, additively: entries from
/// an extra are copied in only under names not already present. The
/// base archive must open cleanly; an unreadable extra is logged and
/// skipped.
pub fn merge_archives(base: &Path, extras: &[PathBuf]) -> Result<Vec<u8>, ComposeError> {
    let file = File::open(base).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ComposeError::NotFound(base.to_path_buf())
        } else {
            ComposeError::Archive(base.to_path_buf(), e.to_string())
        }
    })?;
    let mut base_zip = ZipArchive::new(BufReader::new(file))
        .map_err(|e| ComposeError::Archive(base.to_path_buf(), e.to_string()))?;

    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    let mut present: HashSet<String> = HashSet::new();

    for i in 0..base_zip.len() {
        let entry = base_zip
            .by_index_raw(i)
            .map_err(|e| ComposeError::Archive(base.to_path_buf(), e.to_string()))?;
        present.insert(entry.name().to_string());
        out.raw_copy_file(entry)
            .map_err(|e| ComposeError::Archive(base.to_path_buf(), e.to_string()))?;
    }

    for extra in extras {
        let file = match File::open(extra) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(archive = %extra.display(), error = %e, "Merge source missing, skipped");
                continue;
            }
        };
        let mut extra_zip = match ZipArchive::new(BufReader::new(file)) {
            Ok(zip) => zip,
            Err(e) => {
                tracing::warn!(archive = %extra.display(), error = %e, "Merge source unreadable, skipped");
                continue;
            }
        };

        for i in 0..extra_zip.len() {
            let entry = match extra_zip.by_index_raw(i) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(archive = %extra.display(), error = %e, "Merge entry unreadable, skipped");
                    continue;
                }
            };
            if !present.contains(entry.name()) {
                let name = entry.name().to_string();
                if let Err(e) = out.raw_copy_file(entry) {
                    tracing::warn!(archive = %extra.display(), entry = %name, error = %e, "Merge copy failed, skipped");
                    continue;
                }
                present.insert(name);
            }
        }
    }

    let cursor = out
        .finish()
        .map_err(|e| ComposeError::Archive(base.to_path_buf(), e.to_string()))?;

    Ok(cursor.into_inner())
}

/// Write a ZIP archive from `(name, bytes)` pairs. Fixture builder for
/// archive tests; deflate keeps firmware fixtures small.
pub fn write_archive(path: &Path, files: &[(&str, &[u8])]) -> std::io::Result<()> {
    use std::io::Write;

    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in files {
        zip.start_file(*name, options)?;
        zip.write_all(bytes)?;
    }
    zip.finish()?;
    Ok(())
}
