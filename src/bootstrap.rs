//! Wires configuration into a running orchestrator: opens the databases,
//! picks service implementations, and builds the dispatcher. Shared by the
//! server binary and the CLI trigger.

use crate::config::{AppConfig, CronSettings};
use crate::cron::jobs::all_jobs;
use crate::cron::{CronContext, Dispatcher, TickTime};
use crate::cron_store::{CronStore, SqliteCronStore};
use crate::queue_store::{QueueStore, SqliteQueueStore};
use crate::services::{
    CommunityApiClient, CommunityServices, Geocoder, HttpGeocoder, HttpRelayMailer, Mailer,
    NullCommunityServices, NullGeocoder, NullMailer, Services,
};
use crate::tenant_store::{SqliteTenantStore, TenantStore};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct Runtime {
    pub dispatcher: Arc<Dispatcher>,
    pub cron_store: Arc<dyn CronStore>,
    pub queue_store: Arc<dyn QueueStore>,
    pub tenant_store: Arc<dyn TenantStore>,
    pub services: Services,
    pub settings: CronSettings,
}

impl Runtime {
    pub fn build(config: &AppConfig) -> Result<Self> {
        let cron_store: Arc<dyn CronStore> =
            Arc::new(SqliteCronStore::new(config.cron_db_path())?);
        let queue_store: Arc<dyn QueueStore> =
            Arc::new(SqliteQueueStore::new(config.queue_db_path())?);
        let tenant_store: Arc<dyn TenantStore> =
            Arc::new(SqliteTenantStore::new(config.platform_db_path())?);

        // Finalize run records left over from an interrupted process.
        match cron_store.mark_stale_runs_failed() {
            Ok(count) if count > 0 => {
                info!("Marked {} interrupted runs as failed", count);
            }
            Ok(_) => {}
            Err(err) => {
                error!("Failed to mark interrupted runs: {:#}", err);
            }
        }

        let timeout = Duration::from_secs(config.http_timeout_sec);

        let mailer: Arc<dyn Mailer> = match &config.mail_relay_url {
            Some(url) => {
                info!("Mail relay configured at {}", url);
                Arc::new(HttpRelayMailer::new(url.clone(), timeout))
            }
            None => {
                warn!("No mail relay configured, outbound mail is disabled");
                Arc::new(NullMailer)
            }
        };

        let geocoder: Arc<dyn Geocoder> = match &config.geocoder_url {
            Some(url) => {
                info!("Geocoder configured at {}", url);
                Arc::new(HttpGeocoder::new(url.clone(), timeout))
            }
            None => {
                warn!("No geocoder configured, geocoding is disabled");
                Arc::new(NullGeocoder)
            }
        };

        let community: Arc<dyn CommunityServices> = match &config.community_api_url {
            Some(url) => {
                info!("Community services API configured at {}", url);
                Arc::new(CommunityApiClient::new(url.clone(), timeout))
            }
            None => {
                warn!("No community services API configured, platform jobs will report no work");
                Arc::new(NullCommunityServices)
            }
        };

        let services = Services {
            mailer,
            geocoder,
            community,
        };

        let dispatcher = Arc::new(Dispatcher::new(all_jobs(), Arc::clone(&cron_store)));

        Ok(Self {
            dispatcher,
            cron_store,
            queue_store,
            tenant_store,
            services,
            settings: config.cron.clone(),
        })
    }

    /// Build the context for one invocation. The wall clock is sampled once
    /// here; schedules are local time, due-date comparisons are UTC.
    pub fn make_context(&self, nested: bool) -> CronContext {
        let now = chrono::Local::now();
        CronContext::new(
            TickTime::from_datetime(&now),
            now.with_timezone(&Utc),
            nested,
            self.settings.clone(),
            Arc::clone(&self.cron_store),
            Arc::clone(&self.queue_store),
            Arc::clone(&self.tenant_store),
            self.services.clone(),
        )
    }
}
