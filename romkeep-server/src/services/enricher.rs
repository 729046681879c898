//! Per-file enrichment pipeline.
//!
//! One invocation handles one work-list file: resolve metadata against
//! the lookup service, fetch the requested asset categories, write the
//! catalog row back via full delete+insert. Every failure inside is
//! logged and non-fatal to the batch.

use crate::config::PlatformTable;
use crate::db::entries::{self, CatalogEntry, PLACEHOLDER_SYNOPSIS};
use crate::services::boxart;
use crate::services::media::{MediaCategory, MediaFetcher};
use crate::services::scraper::{clean_name, file_stem, GameMatch, MetadataResolver};
use anyhow::Result;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared dependencies for enrichment tasks
pub struct EnrichContext {
    pub db: SqlitePool,
    pub resolver: Arc<MetadataResolver>,
    pub fetcher: Arc<MediaFetcher>,
    pub platforms: Arc<PlatformTable>,
    pub root: PathBuf,
}

/// Process one file from a partition's work list.
///
/// Cancellation is cooperative: the token is checked before the lookup
/// call and before each asset fetch, never mid-transfer.
pub async fn enrich_file(
    ctx: &EnrichContext,
    system: &str,
    filename: &str,
    options: &crate::types::SyncOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Ok(());
    }

    let path_key = entries::entry_path(system, filename);
    let full_path = ctx.root.join(system).join(filename);
    let existing = entries::load_by_path(&ctx.db, &path_key).await?;

    let lookup_id = ctx.platforms.lookup_id(system);
    let arcade = ctx.platforms.is_arcade(system);

    let matched = ctx
        .resolver
        .resolve(lookup_id, arcade, filename, &full_path)
        .await;

    let mut entry = build_entry(system, filename, existing, matched.as_ref(), options);

    let stem = file_stem(filename).to_string();

    if let Some(game) = &matched {
        fetch_assets(ctx, &mut entry, game, system, &stem, options, cancel).await;
    }

    if options.sync_box_art && !cancel.is_cancelled() {
        compose_box_texture(ctx, &mut entry, system, &stem).await;
    }

    entries::replace_entry(&ctx.db, &entry).await?;

    tracing::debug!(system, filename, matched = matched.is_some(), "Entry processed");
    Ok(())
}

/// Merge resolver output over the prior record. Descriptive fields only
/// move when `sync_info` is set; asset paths survive so a partial fetch
/// never erases previously materialized files.
fn build_entry(
    system: &str,
    filename: &str,
    existing: Option<CatalogEntry>,
    matched: Option<&GameMatch>,
    options: &crate::types::SyncOptions,
) -> CatalogEntry {
    let mut entry = existing.unwrap_or_else(|| {
        let fallback_title = clean_name(filename);
        let title = if fallback_title.is_empty() {
            file_stem(filename).to_string()
        } else {
            fallback_title
        };
        CatalogEntry::new(system, filename, &title)
    });

    match matched {
        Some(game) => {
            entry.title = game.title.clone();
            if options.sync_info {
                entry.synopsis = game
                    .synopsis
                    .clone()
                    .or_else(|| Some(PLACEHOLDER_SYNOPSIS.to_string()));
                entry.rating = game.rating.clone();
                entry.released = game.released.clone();
                entry.developer = game.developer.clone();
                entry.publisher = game.publisher.clone();
                entry.genre = game.genre.clone();
                entry.players = game.players.clone();
            }
        }
        None => {
            if options.sync_info && entry.synopsis.is_none() {
                entry.synopsis = Some(PLACEHOLDER_SYNOPSIS.to_string());
            }
        }
    }

    entry
}

async fn fetch_assets(
    ctx: &EnrichContext,
    entry: &mut CatalogEntry,
    game: &GameMatch,
    system: &str,
    stem: &str,
    options: &crate::types::SyncOptions,
    cancel: &CancellationToken,
) {
    let requests: [(bool, Option<&String>, MediaCategory); 4] = [
        (options.sync_images, game.media.cover.as_ref(), MediaCategory::Image),
        (
            options.sync_images,
            game.media.screenshot.as_ref(),
            MediaCategory::Screenshot,
        ),
        (options.sync_video, game.media.video.as_ref(), MediaCategory::Video),
        (
            options.sync_marquees,
            game.media.marquee.as_ref(),
            MediaCategory::Marquee,
        ),
    ];

    for (wanted, url, category) in requests {
        if !wanted || cancel.is_cancelled() {
            continue;
        }
        let Some(url) = url else { continue };

        match ctx
            .fetcher
            .ensure_local(url, system, category, stem, options.overwrite)
            .await
        {
            Ok(relative) => match category {
                MediaCategory::Image => entry.image = Some(relative),
                MediaCategory::Screenshot => entry.screenshot = Some(relative),
                MediaCategory::Video => entry.video = Some(relative),
                MediaCategory::Marquee => entry.marquee = Some(relative),
                MediaCategory::BoxTexture => entry.box_texture = Some(relative),
            },
            Err(e) => {
                // Non-fatal: the asset-path field stays unset
                tracing::warn!(system, stem, ?category, error = %e, "Asset fetch failed");
            }
        }
    }
}

/// Compose the box texture from the system's case template and the
/// entry's marquee/logo. Skipped quietly when no template is present.
async fn compose_box_texture(ctx: &EnrichContext, entry: &mut CatalogEntry, system: &str, stem: &str) {
    let template = ctx.root.join(system).join("media/templates/case.png");
    if !template.is_file() {
        tracing::debug!(system, "No case template, skipping box texture");
        return;
    }

    let logo = entry.marquee.as_ref().map(|rel| ctx.root.join(rel));
    let relative = format!("{}/media/{}/{}.png", system, MediaCategory::BoxTexture.dir(), stem);
    let target = ctx.root.join(&relative);

    // Decode/resize/encode is CPU-bound work, same as the archive merge
    let result =
        tokio::task::spawn_blocking(move || boxart::compose_box_file(&template, logo.as_deref(), &target))
            .await;

    match result {
        Ok(Ok(())) => entry.box_texture = Some(relative),
        Ok(Err(e)) => {
            tracing::warn!(system, stem, error = %e, "Box texture composition failed");
        }
        Err(e) => {
            tracing::warn!(system, stem, error = %e, "Box texture task failed");
        }
    }
}
