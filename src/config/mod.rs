mod file_config;

pub use file_config::{CronFileConfig, FileConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that participate in config resolution.
/// Mirrors the subset of CLI flags that the TOML file can override.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub cron_key: Option<String>,
    pub mail_relay_url: Option<String>,
    pub geocoder_url: Option<String>,
    pub community_api_url: Option<String>,
    pub http_timeout_sec: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            port: 3004,
            cron_key: None,
            mail_relay_url: None,
            geocoder_url: None,
            community_api_url: None,
            http_timeout_sec: 30,
        }
    }
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    /// Shared secret for the network-facing cron trigger. `None` means the
    /// trigger is not configured and all network requests are rejected.
    pub cron_key: Option<String>,
    pub mail_relay_url: Option<String>,
    pub geocoder_url: Option<String>,
    pub community_api_url: Option<String>,
    pub http_timeout_sec: u64,
    pub cron: CronSettings,
}

/// Orchestrator tuning. These are configuration constants: batch sizes and
/// pauses are never supplied ad hoc by call sites.
#[derive(Debug, Clone)]
pub struct CronSettings {
    /// Queue items claimed per batch by the drain engine.
    pub batch_size: usize,
    /// Backpressure pause between non-empty batches.
    pub batch_pause: Duration,
    /// Smaller batch for the geocode queue, which hits an external HTTP API.
    pub geocode_batch_size: usize,
    /// Age after which a held dispatcher lock is considered abandoned.
    pub lock_stale_after: Duration,
    /// Age after which claimed queue items are released back to pending.
    pub claim_stale_after: Duration,
    /// Sent/failed queue rows older than this are deleted by the cleanup job.
    pub sent_retention_days: u64,
    /// Run log rows older than this are deleted by the cleanup job.
    pub run_log_retention_days: u64,
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_pause: Duration::from_millis(250),
            geocode_batch_size: 25,
            lock_stale_after: Duration::from_secs(15 * 60),
            claim_stale_after: Duration::from_secs(60 * 60),
            sent_retention_days: 30,
            run_log_retention_days: 90,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and an optional TOML file.
    /// TOML values override CLI values where present; the `CRON_KEY`
    /// environment variable is the fallback for the shared secret.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in the config file")
            })?;
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let cron_key = file
            .cron_key
            .or_else(|| cli.cron_key.clone())
            .or_else(|| std::env::var("CRON_KEY").ok())
            .filter(|key| !key.is_empty());

        let cron_file = file.cron.unwrap_or_default();
        let defaults = CronSettings::default();
        let cron = CronSettings {
            batch_size: cron_file.batch_size.unwrap_or(defaults.batch_size).max(1),
            batch_pause: cron_file
                .batch_pause_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_pause),
            geocode_batch_size: cron_file
                .geocode_batch_size
                .unwrap_or(defaults.geocode_batch_size)
                .max(1),
            lock_stale_after: cron_file
                .lock_stale_after_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_stale_after),
            claim_stale_after: cron_file
                .claim_stale_after_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_stale_after),
            sent_retention_days: cron_file
                .sent_retention_days
                .unwrap_or(defaults.sent_retention_days),
            run_log_retention_days: cron_file
                .run_log_retention_days
                .unwrap_or(defaults.run_log_retention_days),
        };

        Ok(Self {
            db_dir,
            port: file.port.unwrap_or(cli.port),
            cron_key,
            mail_relay_url: file.mail_relay_url.or_else(|| cli.mail_relay_url.clone()),
            geocoder_url: file.geocoder_url.or_else(|| cli.geocoder_url.clone()),
            community_api_url: file
                .community_api_url
                .or_else(|| cli.community_api_url.clone()),
            http_timeout_sec: file.http_timeout_sec.unwrap_or(cli.http_timeout_sec),
            cron,
        })
    }

    pub fn cron_db_path(&self) -> PathBuf {
        self.db_dir.join("cron.db")
    }

    pub fn queue_db_path(&self) -> PathBuf {
        self.db_dir.join("queue.db")
    }

    pub fn platform_db_path(&self) -> PathBuf {
        self.db_dir.join("platform.db")
    }
}
