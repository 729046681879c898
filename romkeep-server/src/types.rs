//! Request-level option types shared by the scheduler and the pipeline

use serde::{Deserialize, Serialize};

/// Per-request sync flags.
///
/// Field names mirror the wire format accepted by `POST /sync`. Defaults
/// favor safety for bulk syncs: no video or box-art fetches, incremental
/// processing, no forced overwrite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncOptions {
    /// Refresh descriptive text (title, synopsis, rating, dates, credits)
    pub sync_info: bool,
    /// Fetch cover and screenshot images
    pub sync_images: bool,
    /// Fetch preview videos
    pub sync_video: bool,
    /// Fetch marquee/logo images
    pub sync_marquees: bool,
    /// Compose box textures from the case template and logo
    pub sync_box_art: bool,
    /// Skip files whose existing record already looks complete
    pub incremental: bool,
    /// Re-fetch assets even when a local file already exists
    pub overwrite: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            sync_info: true,
            sync_images: true,
            sync_video: false,
            sync_marquees: true,
            sync_box_art: false,
            incremental: true,
            overwrite: false,
        }
    }
}

impl SyncOptions {
    /// Options used by single-item refresh requests: every category on,
    /// non-incremental, forced overwrite.
    pub fn forced_refresh() -> Self {
        Self {
            sync_info: true,
            sync_images: true,
            sync_video: true,
            sync_marquees: true,
            sync_box_art: true,
            incremental: false,
            overwrite: true,
        }
    }
}
