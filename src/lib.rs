//! Hourbank orchestrator library
//!
//! This library exposes the internal modules for testing and the two
//! binaries (`hourbank-server` and `hourbank-cron`).

pub mod bootstrap;
pub mod config;
pub mod cron;
pub mod cron_store;
pub mod queue_store;
pub mod server;
pub mod services;
pub mod sqlite_persistence;
pub mod tenant_store;

// Re-export commonly used types for convenience
pub use bootstrap::Runtime;
pub use config::{AppConfig, CliConfig, FileConfig};
pub use cron::{CronContext, CronJob, Dispatcher, Schedule, TickTime};
pub use cron_store::{CronStore, SqliteCronStore};
pub use queue_store::{QueueStore, SqliteQueueStore};
pub use server::{make_app, run_server, ServerState};
pub use tenant_store::{SqliteTenantStore, TenantStore};
