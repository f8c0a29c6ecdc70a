use std::{env, path::PathBuf, time::Duration};

use anyhow::Context;
use offerwatch_core::types::TargetSite;

/// Interval between new-member offer refreshes: 24 hours.
pub const NEW_MEMBER_REFRESH_MS: u64 = 86_400_000;

/// Server configuration loaded from environment variables, with CLI
/// overrides applied by `main`.
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Target-site table the scanners sweep
    pub sites: Vec<TargetSite>,

    // Scheduling
    pub scan_interval: Duration,
    pub new_member_refresh: Duration,
    pub new_member_max_age: Duration,
    pub job_timeout: Duration,

    // CORS: keep the permissive catch-all rule as an explicit, ordered-last
    // policy rather than an accident
    pub cors_allow_any: bool,

    // Static assets
    pub asset_dir: PathBuf,

    // Development settings
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let sites = match env::var("OFFERWATCH_SITES") {
            Ok(raw) => parse_sites(&raw)
                .context("invalid OFFERWATCH_SITES value")?,
            Err(_) => default_sites(),
        };

        Ok(Self {
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),

            sites,

            scan_interval: duration_ms_from_env(
                "SCAN_INTERVAL_MS",
                NEW_MEMBER_REFRESH_MS,
            ),
            new_member_refresh: duration_ms_from_env(
                "NEW_MEMBER_REFRESH_MS",
                NEW_MEMBER_REFRESH_MS,
            ),
            new_member_max_age: duration_ms_from_env(
                "NEW_MEMBER_MAX_AGE_MS",
                NEW_MEMBER_REFRESH_MS,
            ),
            job_timeout: duration_ms_from_env(
                "JOB_TIMEOUT_MS",
                10 * 60 * 1000,
            ),

            cors_allow_any: env::var("CORS_ALLOW_ANY")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),

            asset_dir: env::var("ASSET_DIR")
                .unwrap_or_else(|_| "./assets".to_string())
                .into(),

            dev_mode: env::var("DEV_MODE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
        })
    }

    /// Max age for a new-member validation stamp, as a chrono duration.
    pub fn new_member_max_age_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.new_member_max_age)
            .unwrap_or_else(|_| chrono::Duration::hours(24))
    }
}

fn duration_ms_from_env(key: &str, default_ms: u64) -> Duration {
    let ms = env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

/// Parses a comma-separated `name=url` site table.
fn parse_sites(raw: &str) -> anyhow::Result<Vec<TargetSite>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, url) = entry.split_once('=').with_context(|| {
                format!("site entry '{entry}' is not of the form name=url")
            })?;
            Ok(TargetSite::new(name.trim(), url.trim()))
        })
        .collect()
}

/// The fixed set of sites the service harvests by default.
fn default_sites() -> Vec<TargetSite> {
    vec![
        TargetSite::new("rakuten", "https://www.rakuten.com"),
        TargetSite::new("topcashback", "https://www.topcashback.com"),
        TargetSite::new("ibotta", "https://ibotta.com"),
        TargetSite::new("swagbucks", "https://www.swagbucks.com"),
    ]
}
