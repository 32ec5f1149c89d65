//! Score feed synchronization. A background loop pulls the score
//! provider, canonicalizes team names through the resolver, upserts
//! games, and then sweeps pending bets for settlement. A dead feed
//! degrades to a sweep-only cycle instead of failing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::db::models::{Game, GameStatus, ScoreUpdate};
use crate::db::Database;
use crate::error::PipelineError;
use crate::settlement::{self, SweepReport};
use crate::teams::TeamResolver;

/// Trait that every score provider must implement.
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    /// Return a snapshot of today's games with their current scores.
    async fn fetch_scores(&self) -> Result<Vec<ScoreUpdate>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Score provider backed by TheSportsDB free API.
/// Docs: <https://www.thesportsdb.com/api.php>
pub struct SportsDbFeed {
    http: Client,
    api_key: String,
    /// Base URL for overriding in tests
    base_url: String,
}

impl SportsDbFeed {
    pub fn new(api_key: Option<&str>, base_url: Option<&str>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(SportsDbFeed {
            http,
            // "3" is TheSportsDB's public free-tier key
            api_key: api_key.unwrap_or("3").to_string(),
            base_url: base_url
                .unwrap_or("https://www.thesportsdb.com/api/v1/json")
                .to_string(),
        })
    }
}

#[async_trait]
impl ScoreProvider for SportsDbFeed {
    fn name(&self) -> &str {
        "TheSportsDB"
    }

    async fn fetch_scores(&self) -> Result<Vec<ScoreUpdate>> {
        let url = format!("{}/{}/livescore.php", self.base_url, self.api_key);
        debug!("Fetching scores from {}", url);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("TheSportsDB request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("TheSportsDB error: {}", resp.status());
        }

        let raw: serde_json::Value = resp
            .json()
            .await
            .context("Failed to parse TheSportsDB response")?;
        Ok(parse_livescore_response(&raw))
    }
}

fn parse_livescore_response(raw: &serde_json::Value) -> Vec<ScoreUpdate> {
    let events = match raw["events"].as_array() {
        Some(a) => a,
        None => return Vec::new(),
    };

    events
        .iter()
        .filter_map(|ev| {
            let external_ref = ev["idEvent"].as_str()?.to_string();
            let home_team = ev["strHomeTeam"].as_str()?.to_string();
            let away_team = ev["strAwayTeam"].as_str()?.to_string();
            let game_date = ev["dateEvent"]
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .unwrap_or_else(|| Utc::now().date_naive());
            let status = status_from_str(ev["strStatus"].as_str().unwrap_or("In Progress"));

            Some(ScoreUpdate {
                external_ref,
                sport: ev["strSport"].as_str().map(str::to_string),
                league: ev["strLeague"].as_str().map(str::to_string),
                home_team,
                away_team,
                game_date,
                home_score: score_value(&ev["intHomeScore"]),
                away_score: score_value(&ev["intAwayScore"]),
                status,
            })
        })
        .collect()
}

/// Scores arrive as strings on some feeds and numbers on others.
fn score_value(v: &serde_json::Value) -> Option<i32> {
    v.as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| v.as_i64().map(|n| n as i32))
}

fn status_from_str(s: &str) -> GameStatus {
    match s.to_lowercase().as_str() {
        "not started" | "ns" => GameStatus::Scheduled,
        "match finished" | "ft" | "finished" | "aet" | "pen" => GameStatus::Final,
        _ => GameStatus::InProgress,
    }
}

#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub provider: String,
    pub games_synced: i64,
    pub games_failed: i64,
    pub settlement: SweepReport,
}

/// One sync pass: fetch scores, upsert games under canonical team
/// names, then settle whatever went final. Provider failures and
/// timeouts are logged and the cycle continues with an empty snapshot
/// so settlement still runs.
pub async fn run_sync_cycle(
    db: &Database,
    resolver: &TeamResolver,
    provider: &dyn ScoreProvider,
    fetch_timeout: Duration,
) -> Result<SyncReport, PipelineError> {
    let updates = match tokio::time::timeout(fetch_timeout, provider.fetch_scores()).await {
        Ok(Ok(updates)) => updates,
        Ok(Err(err)) => {
            warn!("Provider '{}' failed: {err:#}", provider.name());
            Vec::new()
        }
        Err(_) => {
            warn!(
                "Provider '{}' timed out after {fetch_timeout:?}",
                provider.name()
            );
            Vec::new()
        }
    };

    let mut games_synced = 0i64;
    let mut games_failed = 0i64;
    for update in updates {
        let home = resolver.resolve(&update.home_team).await;
        let away = resolver.resolve(&update.away_team).await;
        let game = Game {
            id: None,
            external_ref: Some(update.external_ref.clone()),
            sport: update.sport.clone(),
            league: update.league.clone(),
            home_team: home.canonical,
            away_team: away.canonical,
            game_date: update.game_date,
            home_score: update.home_score,
            away_score: update.away_score,
            status: update.status,
            updated_at: Utc::now(),
        };
        match db.upsert_game(&game) {
            Ok(_) => games_synced += 1,
            Err(err) => {
                games_failed += 1;
                warn!("Failed to store game {}: {err}", update.external_ref);
            }
        }
    }

    let settlement = settlement::settle_ready_bets(db)?;
    if games_synced > 0 || settlement.settled > 0 {
        info!(
            "Sync via {}: {} games updated, {} bets settled",
            provider.name(),
            games_synced,
            settlement.settled
        );
    }
    Ok(SyncReport {
        provider: provider.name().to_string(),
        games_synced,
        games_failed,
        settlement,
    })
}

/// Spawns the background sync task. Ticks that pile up behind a slow
/// cycle are skipped rather than replayed.
pub fn start_sync_loop(
    db: Database,
    resolver: Arc<TeamResolver>,
    provider: Arc<dyn ScoreProvider>,
    every: Duration,
) {
    tokio::spawn(async move {
        info!(
            "Score sync started ({}, interval={:?})",
            provider.name(),
            every
        );
        let fetch_timeout = every.min(Duration::from_secs(10));
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(err) = run_sync_cycle(&db, &resolver, provider.as_ref(), fetch_timeout).await
            {
                error!("Sync cycle failed: {err}");
            }
        }
    });
}
