//! Shared helpers for cron-layer tests.

use super::context::CronContext;
use super::schedule::TickTime;
use crate::config::CronSettings;
use crate::cron_store::SqliteCronStore;
use crate::queue_store::SqliteQueueStore;
use crate::services::Services;
use crate::tenant_store::SqliteTenantStore;
use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;

/// A context over fresh temp-file stores and null services, plus the temp dir
/// keeping them alive. Backpressure pauses are zeroed so tests run fast.
pub fn test_context(tick: TickTime, nested: bool) -> (CronContext, TempDir) {
    test_context_with(tick, nested, Services::null())
}

pub fn test_context_with(
    tick: TickTime,
    nested: bool,
    services: Services,
) -> (CronContext, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let cron_store = Arc::new(SqliteCronStore::new(temp_dir.path().join("cron.db")).unwrap());
    let queue_store = Arc::new(SqliteQueueStore::new(temp_dir.path().join("queue.db")).unwrap());
    let tenant_store =
        Arc::new(SqliteTenantStore::new(temp_dir.path().join("platform.db")).unwrap());

    let settings = CronSettings {
        batch_size: 50,
        batch_pause: std::time::Duration::ZERO,
        ..CronSettings::default()
    };

    let ctx = CronContext::new(
        tick,
        Utc::now(),
        nested,
        settings,
        cron_store,
        queue_store,
        tenant_store,
        services,
    );
    (ctx, temp_dir)
}

/// Mailer that records deliveries and can refuse one recipient.
pub struct RecordingMailer {
    pub sent: std::sync::Mutex<Vec<(String, String)>>,
    pub refuse: Option<String>,
}

impl RecordingMailer {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            sent: std::sync::Mutex::new(Vec::new()),
            refuse: None,
        })
    }

    pub fn refusing(recipient: &str) -> Arc<Self> {
        Arc::new(Self {
            sent: std::sync::Mutex::new(Vec::new()),
            refuse: Some(recipient.to_string()),
        })
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl crate::services::Mailer for RecordingMailer {
    fn send(&self, to: &str, subject: &str, _body: &str) -> anyhow::Result<()> {
        if self.refuse.as_deref() == Some(to) {
            anyhow::bail!("relay refused recipient");
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

/// Community-services double: records every call as `(op, tenant_id)`,
/// returns a fixed processed count, and can fail for one tenant id.
pub struct StubCommunity {
    pub calls: std::sync::Mutex<Vec<(String, i64)>>,
    pub recipients: Vec<String>,
    pub processed: usize,
    pub fail_for_tenant: Option<i64>,
}

impl StubCommunity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: std::sync::Mutex::new(Vec::new()),
            recipients: Vec::new(),
            processed: 1,
            fail_for_tenant: None,
        })
    }

    pub fn with_recipients(recipients: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            calls: std::sync::Mutex::new(Vec::new()),
            recipients,
            processed: 1,
            fail_for_tenant: None,
        })
    }

    pub fn failing_for(tenant_id: i64) -> Arc<Self> {
        Arc::new(Self {
            calls: std::sync::Mutex::new(Vec::new()),
            recipients: Vec::new(),
            processed: 1,
            fail_for_tenant: Some(tenant_id),
        })
    }

    pub fn calls_for(&self, op: &str) -> Vec<i64> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == op)
            .map(|(_, tenant)| *tenant)
            .collect()
    }

    fn record(&self, op: &str, tenant_id: i64) -> anyhow::Result<usize> {
        if self.fail_for_tenant == Some(tenant_id) {
            anyhow::bail!("community API unavailable for tenant {}", tenant_id);
        }
        self.calls
            .lock()
            .unwrap()
            .push((op.to_string(), tenant_id));
        Ok(self.processed)
    }
}

impl crate::services::CommunityServices for StubCommunity {
    fn newsletter_recipients(
        &self,
        tenant_id: i64,
        _newsletter_id: &str,
    ) -> anyhow::Result<Vec<String>> {
        self.record("newsletter-recipients", tenant_id)?;
        Ok(self.recipients.clone())
    }

    fn store_coordinates(
        &self,
        tenant_id: i64,
        _entity_kind: &str,
        _entity_id: i64,
        _point: crate::services::GeoPoint,
    ) -> anyhow::Result<()> {
        self.record("store-coordinates", tenant_id)?;
        Ok(())
    }

    fn notify_hot_matches(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("notify-hot-matches", tenant_id)
    }

    fn send_match_digests(
        &self,
        tenant_id: i64,
        frequency: crate::queue_store::Frequency,
    ) -> anyhow::Result<usize> {
        self.record(&format!("send-match-digests:{}", frequency), tenant_id)
    }

    fn warm_match_cache(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("warm-match-cache", tenant_id)
    }

    fn run_gamification_daily(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("gamification-daily", tenant_id)
    }

    fn process_campaigns(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("gamification-campaigns", tenant_id)
    }

    fn check_challenges(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("gamification-challenges", tenant_id)
    }

    fn snapshot_leaderboards(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("leaderboard-snapshot", tenant_id)
    }

    fn send_gamification_weekly(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("gamification-weekly-digest", tenant_id)
    }

    fn update_featured_groups(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("update-featured-groups", tenant_id)
    }

    fn send_group_digests(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("group-digests", tenant_id)
    }

    fn send_federation_digests(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("federation-digests", tenant_id)
    }

    fn send_event_reminders(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("event-reminders", tenant_id)
    }

    fn scan_for_abuse(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("abuse-scan", tenant_id)
    }

    fn reconcile_wallets(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("wallet-reconciliation", tenant_id)
    }

    fn cleanup_expired(&self, tenant_id: i64) -> anyhow::Result<usize> {
        self.record("cleanup-expired", tenant_id)
    }
}

/// A fresh context over the databases already living in `dir`, for tests
/// that need several invocations against the same stores.
pub fn context_in(dir: &TempDir, tick: TickTime, nested: bool) -> CronContext {
    let settings = CronSettings {
        batch_pause: std::time::Duration::ZERO,
        ..CronSettings::default()
    };
    CronContext::new(
        tick,
        Utc::now(),
        nested,
        settings,
        Arc::new(cron_store_at(dir)),
        Arc::new(queue_store_at(dir)),
        Arc::new(tenant_store_at(dir)),
        Services::null(),
    )
}

/// Downcast helpers: the context stores trait objects, tests want the
/// concrete sqlite stores they created. Reconstruct via the same paths.
pub fn tenant_store_at(dir: &TempDir) -> SqliteTenantStore {
    SqliteTenantStore::new(dir.path().join("platform.db")).unwrap()
}

pub fn queue_store_at(dir: &TempDir) -> SqliteQueueStore {
    SqliteQueueStore::new(dir.path().join("queue.db")).unwrap()
}

pub fn cron_store_at(dir: &TempDir) -> SqliteCronStore {
    SqliteCronStore::new(dir.path().join("cron.db")).unwrap()
}
