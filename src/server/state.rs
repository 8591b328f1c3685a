use crate::bootstrap::Runtime;
use crate::config::AppConfig;
use std::sync::Arc;
use std::time::Instant;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct ServerState {
    pub config: AppConfig,
    pub runtime: Arc<Runtime>,
    pub start_time: Instant,
}

impl ServerState {
    pub fn new(config: AppConfig, runtime: Arc<Runtime>) -> Self {
        Self {
            config,
            runtime,
            start_time: Instant::now(),
        }
    }
}
