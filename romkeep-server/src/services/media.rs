//! Media fetcher with a content-addressed dedup cache.
//!
//! `ensure_local` guarantees a file exists at the computed target path.
//! A URL already materialized elsewhere on disk is hard-linked into
//! place instead of re-fetched, so identical assets shared by ROM
//! variants cost one download and one copy of storage.

use crate::db::media_cache;
use futures::StreamExt;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

const USER_AGENT: &str = concat!("romkeep/", env!("CARGO_PKG_VERSION"));
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Media fetcher errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Download failed for {0}: {1}")]
    Http(String, String),

    #[error("IO error at {0}: {1}")]
    Io(PathBuf, String),

    #[error("Cache error: {0}")]
    Cache(String),
}

/// Asset category, mapping to one sub-directory and one entry field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCategory {
    Image,
    Video,
    Marquee,
    BoxTexture,
    Screenshot,
}

impl MediaCategory {
    /// Sub-directory under `<system>/media/`
    pub fn dir(&self) -> &'static str {
        match self {
            MediaCategory::Image => "images",
            MediaCategory::Video => "videos",
            MediaCategory::Marquee => "marquees",
            MediaCategory::BoxTexture => "boxart",
            MediaCategory::Screenshot => "screenshots",
        }
    }

    /// Extension used when the URL does not carry a usable one
    pub fn default_ext(&self) -> &'static str {
        match self {
            MediaCategory::Video => "mp4",
            _ => "png",
        }
    }

    /// All categories with a media sub-directory (for the orphan sweep)
    pub fn all() -> &'static [MediaCategory] {
        &[
            MediaCategory::Image,
            MediaCategory::Video,
            MediaCategory::Marquee,
            MediaCategory::BoxTexture,
            MediaCategory::Screenshot,
        ]
    }
}

/// Downloads or hard-links binary assets into the library tree
pub struct MediaFetcher {
    http: reqwest::Client,
    root: PathBuf,
    db: SqlitePool,
}

impl MediaFetcher {
    pub fn new(root: impl Into<PathBuf>, db: SqlitePool) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            root: root.into(),
            db,
        }
    }

    /// Relative target path for an asset
    pub fn relative_target(
        &self,
        system: &str,
        category: MediaCategory,
        stem: &str,
        url: &str,
    ) -> String {
        let ext = url_extension(url).unwrap_or_else(|| category.default_ext().to_string());
        format!("{}/media/{}/{}.{}", system, category.dir(), stem, ext)
    }

    /// Ensure a local file exists for `url` at the computed target path.
    ///
    /// Returns the relative path to store on the catalog entry. Failures
    /// leave no partial file behind; the caller treats them as non-fatal
    /// and leaves its asset-path field unset.
    pub async fn ensure_local(
        &self,
        url: &str,
        system: &str,
        category: MediaCategory,
        stem: &str,
        overwrite: bool,
    ) -> Result<String, FetchError> {
        let relative = self.relative_target(system, category, stem, url);
        let target = self.root.join(&relative);

        if overwrite {
            if target.exists() {
                std::fs::remove_file(&target)
                    .map_err(|e| FetchError::Io(target.clone(), e.to_string()))?;
            }
        } else if file_is_nonempty(&target) {
            // Idempotent skip
            return Ok(relative);
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FetchError::Io(parent.to_path_buf(), e.to_string()))?;
        }

        // Dedup: hard-link an existing copy of the same URL when it
        // still exists on disk. A stale cache row is just a miss.
        if !overwrite {
            if let Some(cached) = media_cache::lookup(&self.db, url)
                .await
                .map_err(|e| FetchError::Cache(e.to_string()))?
            {
                let source = self.root.join(&cached);
                if cached != relative && file_is_nonempty(&source) {
                    match link_or_copy(&source, &target) {
                        Ok(()) => {
                            tracing::debug!(url, target = %relative, "Media served from dedup cache");
                            return Ok(relative);
                        }
                        Err(e) => {
                            tracing::warn!(url, error = %e, "Dedup link failed, downloading instead");
                        }
                    }
                }
            }
        }

        self.download_to(url, &target).await?;

        if let Err(e) = media_cache::register(&self.db, url, &relative).await {
            // Losing a cache row only costs a future duplicate download
            tracing::warn!(url, error = %e, "Failed to register media cache entry");
        }

        tracing::debug!(url, target = %relative, "Media downloaded");
        Ok(relative)
    }

    /// Stream the remote resource to the target path, removing any
    /// partial file on failure.
    async fn download_to(&self, url: &str, target: &Path) -> Result<(), FetchError> {
        let result = self.try_download(url, target).await;
        if result.is_err() && target.exists() {
            let _ = std::fs::remove_file(target);
        }
        result
    }

    async fn try_download(&self, url: &str, target: &Path) -> Result<(), FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Http(url.to_string(), e.to_string()))?;

        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(|e| FetchError::Io(target.to_path_buf(), e.to_string()))?;

        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::Http(url.to_string(), e.to_string()))?;
            written += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::Io(target.to_path_buf(), e.to_string()))?;
        }
        file.flush()
            .await
            .map_err(|e| FetchError::Io(target.to_path_buf(), e.to_string()))?;

        if written == 0 {
            return Err(FetchError::Http(
                url.to_string(),
                "empty response body".to_string(),
            ));
        }

        Ok(())
    }
}

fn file_is_nonempty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Hard link, falling back to a copy when linking fails (e.g. the
/// library spans filesystems).
fn link_or_copy(source: &Path, target: &Path) -> std::io::Result<()> {
    match std::fs::hard_link(source, target) {
        Ok(()) => Ok(()),
        Err(_) => std::fs::copy(source, target).map(|_| ()),
    }
}

fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}
