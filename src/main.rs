use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod api;
mod config;
mod corrections;
mod db;
mod error;
mod import;
mod ingest;
mod settlement;
mod sync;
mod teams;
mod validation;

use api::AppState;
use config::Config;
use db::Database;
use sync::{ScoreProvider, SportsDbFeed};
use teams::{SystemClock, TeamResolver};
use validation::ValidationSettings;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    if db.count_aliases()? == 0 {
        warn!("Alias table is empty; team names will only match verbatim or fuzzily");
    }

    let resolver = Arc::new(TeamResolver::new(
        {
            let db = db.clone();
            Arc::new(move || db.list_aliases())
        },
        Arc::new(SystemClock),
        Duration::from_secs(config.alias_cache_ttl_secs),
        config.team_match_threshold,
    ));

    let provider: Arc<dyn ScoreProvider> = Arc::new(SportsDbFeed::new(
        config.score_api_key.as_deref(),
        Some(&config.score_api_url),
    )?);

    if config.no_sync {
        info!("Background sync disabled; scores update only via POST /api/sync");
    } else {
        sync::start_sync_loop(
            db.clone(),
            resolver.clone(),
            provider.clone(),
            Duration::from_secs(config.sync_interval_secs),
        );
    }

    let state = AppState {
        db,
        resolver,
        provider,
        settings: ValidationSettings {
            team_fail_below: config.team_match_threshold,
            payout_tolerance: config.payout_tolerance,
            ..Default::default()
        },
        max_upload_bytes: config.max_upload_bytes,
        max_upload_rows: config.max_upload_rows,
        sync_timeout: Duration::from_secs(10),
    };
    let app = api::router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
