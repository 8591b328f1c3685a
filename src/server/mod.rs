//! HTTP surface: the cron trigger endpoints, the operations JSON endpoints
//! and the metrics exporter.

pub mod metrics;
mod server;
mod state;

pub use server::{make_app, run_server};
pub use state::ServerState;
