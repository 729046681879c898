//! romkeep-server - ROM library management service
//!
//! Reconciles a partitioned ROM library against its SQLite catalog,
//! enriches entries from a remote lookup service, and serves the
//! catalog plus on-demand merged archives over HTTP.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use romkeep_common::config::{resolve_root_folder, TomlConfig};
use romkeep_server::config::PlatformTable;
use romkeep_server::scheduler::{runner::INTER_TASK_DELAY, SyncScheduler, TaskRunner};
use romkeep_server::services::composer::ArchiveComposer;
use romkeep_server::services::enricher::EnrichContext;
use romkeep_server::services::media::MediaFetcher;
use romkeep_server::services::scanner::RomScanner;
use romkeep_server::services::scraper::{LookupClient, MetadataResolver};
use romkeep_server::AppState;

const DEFAULT_LISTEN: &str = "127.0.0.1:5780";

#[derive(Parser, Debug)]
#[command(name = "romkeep-server", version, about = "ROM library management service")]
struct Args {
    /// Library root folder (overrides config and ROMKEEP_ROOT)
    #[arg(long)]
    root: Option<String>,

    /// Listen address, e.g. 127.0.0.1:5780
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting romkeep-server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = TomlConfig::load().unwrap_or_else(|e| {
        tracing::warn!("Config not loaded ({}), using defaults", e);
        TomlConfig::default()
    });

    let root = resolve_root_folder(args.root.as_deref(), &config);
    std::fs::create_dir_all(&root)
        .map_err(|e| anyhow::anyhow!("Failed to create root folder {}: {}", root.display(), e))?;
    info!("Library root: {}", root.display());

    let db_path = root.join(".romkeep").join("catalog.db");
    let db = romkeep_server::db::init_database_pool(&db_path).await?;
    info!("Database: {}", db_path.display());

    let platforms = PlatformTable::load(&config);
    let scanner = Arc::new(RomScanner::new(&root));

    // Environment overrides TOML for lookup-service settings
    let mut scraper = config.scraper.clone();
    for (var, field) in [
        ("ROMKEEP_SCRAPER_URL", &mut scraper.base_url),
        ("ROMKEEP_SCRAPER_USER", &mut scraper.username),
        ("ROMKEEP_SCRAPER_PASSWORD", &mut scraper.password),
    ] {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                *field = Some(value);
            }
        }
    }

    let resolver = match LookupClient::new(&scraper) {
        Ok(client) => Arc::new(MetadataResolver::new(client)),
        Err(e) => {
            tracing::warn!("Lookup service not configured ({}), metadata sync will miss", e);
            Arc::new(MetadataResolver::offline())
        }
    };

    let fetcher = Arc::new(MediaFetcher::new(&root, db.clone()));
    let ctx = Arc::new(EnrichContext {
        db: db.clone(),
        resolver,
        fetcher,
        platforms: Arc::clone(&platforms),
        root: root.clone(),
    });

    let runner = TaskRunner::start(INTER_TASK_DELAY);
    let scheduler = SyncScheduler::new(runner, Arc::clone(&scanner), ctx);
    let composer = Arc::new(ArchiveComposer::new(
        db.clone(),
        Arc::clone(&platforms),
        &root,
    ));

    let state = AppState {
        db,
        root,
        platforms,
        scanner,
        scheduler,
        composer,
    };
    let app = romkeep_server::build_router(state);

    let listen = args
        .listen
        .or(config.listen_addr)
        .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!("Listening on http://{}", listen);

    axum::serve(listener, app).await?;

    Ok(())
}
