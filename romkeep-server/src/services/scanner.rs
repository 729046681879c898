//! ROM file scanner.
//!
//! Lists system partitions and their ROM files from the library root,
//! filtered by an explicit extension allow-list. Directory listings are
//! memoized with time-based expiry to avoid repeated scans of large
//! partitions; the cache is never invalidated by writes, only by expiry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// File extensions treated as ROMs
pub const ROM_EXTENSIONS: &[&str] = &[
    "zip", "7z", "nes", "fds", "sfc", "smc", "md", "gen", "sms", "gg", "gb", "gbc", "gba",
    "n64", "z64", "v64", "pce", "a26", "iso", "chd", "cue", "bin", "img", "pbp", "cso", "rom",
];

/// Directories under the library root that are never partitions, and
/// directories inside a partition that never hold ROMs (media, cache,
/// firmware, save-state folders).
pub const IGNORED_DIRS: &[&str] = &[
    "media", "images", "videos", "marquees", "boxart", "screenshots", "templates", "bios",
    "saves", "states", "cache", "downloaded_media",
];

const DEFAULT_LISTING_TTL: Duration = Duration::from_secs(30);

/// ROM scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Cannot read directory contents
    #[error("Directory read error {0}: {1}")]
    ReadError(PathBuf, String),
}

/// ROM file scanner with a TTL-based listing cache
pub struct RomScanner {
    root: PathBuf,
    ttl: Duration,
    listings: Mutex<HashMap<String, (Instant, Arc<Vec<String>>)>>,
}

impl RomScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_ttl(root, DEFAULT_LISTING_TTL)
    }

    pub fn with_ttl(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
            listings: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List system partition directories under the library root
    pub fn list_systems(&self) -> Result<Vec<String>, ScanError> {
        let entries = read_dir_checked(&self.root)?;

        let mut systems: Vec<String> = entries
            .into_iter()
            .filter(|(name, is_dir)| *is_dir && !is_ignored_dir(name))
            .map(|(name, _)| name)
            .collect();
        systems.sort();

        Ok(systems)
    }

    /// List ROM filenames within one system partition.
    ///
    /// Served from the listing cache when the previous scan is younger
    /// than the TTL. An unreadable partition directory is an error the
    /// caller treats as fatal for the batch.
    pub fn list_roms(&self, system: &str) -> Result<Arc<Vec<String>>, ScanError> {
        {
            let listings = self.listings.lock().unwrap();
            if let Some((scanned_at, files)) = listings.get(system) {
                if scanned_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(files));
                }
            }
        }

        let dir = self.root.join(system);
        let entries = read_dir_checked(&dir)?;

        let mut files: Vec<String> = entries
            .into_iter()
            .filter(|(name, is_dir)| !is_dir && is_rom_filename(name))
            .map(|(name, _)| name)
            .collect();
        files.sort();

        let files = Arc::new(files);
        self.listings
            .lock()
            .unwrap()
            .insert(system.to_string(), (Instant::now(), Arc::clone(&files)));

        Ok(files)
    }
}

fn read_dir_checked(dir: &Path) -> Result<Vec<(String, bool)>, ScanError> {
    if !dir.exists() {
        return Err(ScanError::PathNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir.to_path_buf()));
    }

    let mut entries = Vec::new();
    let iter = std::fs::read_dir(dir)
        .map_err(|e| ScanError::ReadError(dir.to_path_buf(), e.to_string()))?;

    for entry in iter {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Error accessing entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        entries.push((name, is_dir));
    }

    Ok(entries)
}

fn is_ignored_dir(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IGNORED_DIRS.contains(&lower.as_str())
}

/// Check filename against the ROM extension allow-list
pub fn is_rom_filename(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| ROM_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn library_fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir_all(root.join("nes")).unwrap();
        fs::create_dir_all(root.join("snes")).unwrap();
        fs::create_dir_all(root.join("media")).unwrap();
        fs::create_dir_all(root.join("bios")).unwrap();
        fs::create_dir_all(root.join("nes/media/images")).unwrap();

        fs::write(root.join("nes/mario.zip"), b"zip").unwrap();
        fs::write(root.join("nes/zelda.nes"), b"rom").unwrap();
        fs::write(root.join("nes/notes.txt"), b"text").unwrap();
        fs::write(root.join("snes/chrono.sfc"), b"rom").unwrap();

        temp
    }

    #[test]
    fn test_extension_allow_list() {
        assert!(is_rom_filename("game.zip"));
        assert!(is_rom_filename("game.SFC"));
        assert!(!is_rom_filename("game.txt"));
        assert!(!is_rom_filename("no_extension"));
    }

    #[test]
    fn test_list_systems_skips_ignored_dirs() {
        let temp = library_fixture();
        let scanner = RomScanner::new(temp.path());

        let systems = scanner.list_systems().unwrap();
        assert_eq!(systems, vec!["nes".to_string(), "snes".to_string()]);
    }

    #[test]
    fn test_list_roms_filters_by_extension() {
        let temp = library_fixture();
        let scanner = RomScanner::new(temp.path());

        let roms = scanner.list_roms("nes").unwrap();
        assert_eq!(*roms, vec!["mario.zip".to_string(), "zelda.nes".to_string()]);
    }

    #[test]
    fn test_missing_partition_is_error() {
        let temp = library_fixture();
        let scanner = RomScanner::new(temp.path());

        match scanner.list_roms("gamegear") {
            Err(ScanError::PathNotFound(_)) => {}
            other => panic!("Expected PathNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_listing_cache_serves_stale_within_ttl() {
        let temp = library_fixture();
        let scanner = RomScanner::with_ttl(temp.path(), Duration::from_secs(60));

        let first = scanner.list_roms("nes").unwrap();
        fs::write(temp.path().join("nes/metroid.nes"), b"rom").unwrap();

        // Cache hit: new file not visible until expiry
        let second = scanner.list_roms("nes").unwrap();
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_listing_cache_expires() {
        let temp = library_fixture();
        let scanner = RomScanner::with_ttl(temp.path(), Duration::from_millis(0));

        scanner.list_roms("nes").unwrap();
        fs::write(temp.path().join("nes/metroid.nes"), b"rom").unwrap();

        let refreshed = scanner.list_roms("nes").unwrap();
        assert!(refreshed.contains(&"metroid.nes".to_string()));
    }
}
