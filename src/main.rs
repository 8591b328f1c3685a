use anyhow::{Context, Result};
use clap::Parser;
use hourbank_server::bootstrap::Runtime;
use hourbank_server::config::{AppConfig, CliConfig, FileConfig};
use hourbank_server::server;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the SQLite databases (cron.db, queue.db, platform.db).
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Optional TOML config file; file values override CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3004)]
    pub port: u16,

    /// Shared secret for the network cron trigger. Falls back to the
    /// CRON_KEY environment variable; without either, network triggers are
    /// rejected.
    #[clap(long)]
    pub cron_key: Option<String>,

    /// Base URL of the HTTP mail relay.
    #[clap(long)]
    pub mail_relay_url: Option<String>,

    /// Base URL of the HTTP geocoder.
    #[clap(long)]
    pub geocoder_url: Option<String>,

    /// Base URL of the platform's community services API.
    #[clap(long)]
    pub community_api_url: Option<String>,

    /// Timeout in seconds for outbound HTTP requests.
    #[clap(long, default_value_t = 30)]
    pub http_timeout_sec: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };

    let cli_config = CliConfig {
        db_dir: cli_args.db_dir,
        port: cli_args.port,
        cron_key: cli_args.cron_key,
        mail_relay_url: cli_args.mail_relay_url,
        geocoder_url: cli_args.geocoder_url,
        community_api_url: cli_args.community_api_url,
        http_timeout_sec: cli_args.http_timeout_sec,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    if config.cron_key.is_none() {
        info!("No cron key configured; only the hourbank-cron CLI can trigger runs");
    }

    server::metrics::init_metrics();

    info!("Opening databases in {:?}...", config.db_dir);
    let runtime = Arc::new(Runtime::build(&config)?);
    info!(
        "Cron orchestrator ready with {} registered jobs",
        runtime.dispatcher.jobs().len()
    );

    server::run_server(config, runtime).await
}
