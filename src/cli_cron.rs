//! Trusted local cron trigger.
//!
//! Runs the dispatcher (or a single job) directly against the databases and
//! prints the execution trace to stdout. Local invocations bypass the shared
//! secret entirely; this is the path for the machine's own crontab.

use anyhow::Result;
use clap::Parser;
use hourbank_server::bootstrap::Runtime;
use hourbank_server::config::{AppConfig, CliConfig, FileConfig};
use hourbank_server::cron::guard::{authorize, Trigger};
use hourbank_server::cron::JobError;
use hourbank_server::cron_store::RunStatus;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the SQLite databases (cron.db, queue.db, platform.db).
    #[clap(long)]
    pub db_dir: Option<PathBuf>,

    /// Optional TOML config file; file values override CLI flags.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Base URL of the HTTP mail relay.
    #[clap(long)]
    pub mail_relay_url: Option<String>,

    /// Base URL of the HTTP geocoder.
    #[clap(long)]
    pub geocoder_url: Option<String>,

    /// Base URL of the platform's community services API.
    #[clap(long)]
    pub community_api_url: Option<String>,

    /// Job id to run, or "run-all" for the full tick.
    #[clap(default_value = "run-all")]
    pub job: String,
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
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
        mail_relay_url: cli_args.mail_relay_url,
        geocoder_url: cli_args.geocoder_url,
        community_api_url: cli_args.community_api_url,
        ..Default::default()
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    // Local invocations are trusted unconditionally.
    authorize(config.cron_key.as_deref(), &Trigger::Cli)?;

    let runtime = Runtime::build(&config)?;
    let ctx = runtime.make_context(false);

    let status = if cli_args.job == "run-all" {
        runtime.dispatcher.run_all(&ctx)
    } else {
        match runtime.dispatcher.run_job(&cli_args.job, &ctx) {
            Ok(status) => status,
            Err(JobError::NotFound) => {
                eprintln!("Unknown job '{}'. Available jobs:", cli_args.job);
                for job in runtime.dispatcher.jobs() {
                    eprintln!("  {:<28} {}", job.id(), job.schedule().describe());
                }
                std::process::exit(2);
            }
            Err(err) => return Err(err.into()),
        }
    };

    print!("{}", ctx.output());
    if status == RunStatus::Error {
        std::process::exit(1);
    }
    Ok(())
}
