use clap::Parser;

/// Wager spreadsheet ingestion and settlement service
#[derive(Parser, Debug, Clone)]
#[command(name = "wagerbook", version, about)]
pub struct Config {
    /// API listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "wagerbook.db")]
    pub database_path: String,

    /// Maximum accepted upload size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "10485760")]
    pub max_upload_bytes: usize,

    /// Maximum number of data rows per upload
    #[arg(long, env = "MAX_UPLOAD_ROWS", default_value = "5000")]
    pub max_upload_rows: usize,

    /// Team alias cache time-to-live in seconds
    #[arg(long, env = "ALIAS_CACHE_TTL_SECS", default_value = "300")]
    pub alias_cache_ttl_secs: u64,

    /// Minimum similarity for a fuzzy team-name match (0.0–1.0)
    #[arg(long, env = "TEAM_MATCH_THRESHOLD", default_value = "0.75")]
    pub team_match_threshold: f64,

    /// Absolute tolerance when checking claimed payouts (USD)
    #[arg(long, env = "PAYOUT_TOLERANCE", default_value = "0.01")]
    pub payout_tolerance: f64,

    /// Score feed API URL (e.g., TheSportsDB or similar)
    #[arg(
        long,
        env = "SCORE_API_URL",
        default_value = "https://www.thesportsdb.com/api/v1/json"
    )]
    pub score_api_url: String,

    /// Score feed API key
    #[arg(long, env = "SCORE_API_KEY")]
    pub score_api_key: Option<String>,

    /// Score sync and settlement sweep interval in seconds
    #[arg(long, env = "SYNC_INTERVAL_SECS", default_value = "60")]
    pub sync_interval_secs: u64,

    /// Disable the background sync loop (POST /api/sync still works)
    #[arg(long, env = "NO_SYNC", default_value = "false")]
    pub no_sync: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be positive");
        }
        if self.max_upload_rows == 0 {
            anyhow::bail!("max_upload_rows must be positive");
        }
        if !(0.0..=1.0).contains(&self.team_match_threshold) {
            anyhow::bail!("team_match_threshold must be between 0.0 and 1.0");
        }
        if self.payout_tolerance < 0.0 {
            anyhow::bail!("payout_tolerance must not be negative");
        }
        if self.alias_cache_ttl_secs == 0 {
            anyhow::bail!("alias_cache_ttl_secs must be positive");
        }
        if self.sync_interval_secs == 0 {
            anyhow::bail!("sync_interval_secs must be positive");
        }
        Ok(())
    }
}
