use crate::queue_store::Frequency;
use crate::services::GeoPoint;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;

/// The platform's internal community-services API.
///
/// Everything behind this trait is business logic owned by the platform
/// proper: how a match score is computed, what a gamification campaign
/// awards, which group owners get analytics digests. The orchestrator only
/// decides *when* each operation runs and for which tenant, and records how
/// many things the operation reports having processed.
pub trait CommunityServices: Send + Sync {
    /// Recipient list for a newsletter send (subscribers minus suppressions).
    fn newsletter_recipients(&self, tenant_id: i64, newsletter_id: &str) -> Result<Vec<String>>;

    /// Store resolved coordinates for a user or listing.
    fn store_coordinates(
        &self,
        tenant_id: i64,
        entity_kind: &str,
        entity_id: i64,
        point: GeoPoint,
    ) -> Result<()>;

    /// Notify users of fresh high-scoring matches. Returns notifications sent.
    fn notify_hot_matches(&self, tenant_id: i64) -> Result<usize>;

    /// Send match digests to users on the given cadence.
    fn send_match_digests(&self, tenant_id: i64, frequency: Frequency) -> Result<usize>;

    /// Precompute match scores into the platform's match cache.
    fn warm_match_cache(&self, tenant_id: i64) -> Result<usize>;

    /// Streak resets, daily bonuses and badge checks.
    fn run_gamification_daily(&self, tenant_id: i64) -> Result<usize>;

    /// Recurring achievement campaigns.
    fn process_campaigns(&self, tenant_id: i64) -> Result<usize>;

    /// Expire completed challenges, update friend-challenge state.
    fn check_challenges(&self, tenant_id: i64) -> Result<usize>;

    /// Daily leaderboard snapshots and season finalization.
    fn snapshot_leaderboards(&self, tenant_id: i64) -> Result<usize>;

    /// Weekly progress emails for users who earned XP or badges.
    fn send_gamification_weekly(&self, tenant_id: i64) -> Result<usize>;

    /// Re-rank featured groups.
    fn update_featured_groups(&self, tenant_id: i64) -> Result<usize>;

    /// Weekly analytics digests for group owners.
    fn send_group_digests(&self, tenant_id: i64) -> Result<usize>;

    /// Weekly federation activity digests for opted-in users.
    fn send_federation_digests(&self, tenant_id: i64) -> Result<usize>;

    /// Reminders for upcoming community events.
    fn send_event_reminders(&self, tenant_id: i64) -> Result<usize>;

    /// Scan timebanking transactions for abuse patterns. Returns alerts raised.
    fn scan_for_abuse(&self, tenant_id: i64) -> Result<usize>;

    /// Audit wallet balances against the transaction ledger.
    fn reconcile_wallets(&self, tenant_id: i64) -> Result<usize>;

    /// Drop expired platform-side caches and tokens.
    fn cleanup_expired(&self, tenant_id: i64) -> Result<usize>;
}

#[derive(Debug, Deserialize)]
struct OpResponse {
    processed: usize,
}

#[derive(Debug, Deserialize)]
struct RecipientsResponse {
    recipients: Vec<String>,
}

/// HTTP client for the community-services API.
///
/// One `POST {base}/internal/{op}` per operation with a JSON body carrying the
/// tenant id and operation parameters.
pub struct CommunityApiClient {
    base_url: String,
    timeout: Duration,
    client: OnceLock<reqwest::blocking::Client>,
}

impl CommunityApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&reqwest::blocking::Client> {
        if self.client.get().is_none() {
            let client = reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()
                .context("Failed to build community API HTTP client")?;
            let _ = self.client.set(client);
        }
        Ok(self.client.get().expect("client initialized above"))
    }

    fn post(&self, op: &str, body: serde_json::Value) -> Result<reqwest::blocking::Response> {
        self.client()?
            .post(format!("{}/internal/{}", self.base_url, op))
            .json(&body)
            .send()
            .with_context(|| format!("Community API request '{}' failed", op))?
            .error_for_status()
            .with_context(|| format!("Community API rejected '{}'", op))
    }

    fn call(&self, op: &str, tenant_id: i64) -> Result<usize> {
        self.call_with(op, json!({ "tenant_id": tenant_id }))
    }

    fn call_with(&self, op: &str, body: serde_json::Value) -> Result<usize> {
        let response: OpResponse = self
            .post(op, body)?
            .json()
            .with_context(|| format!("Community API returned malformed JSON for '{}'", op))?;
        Ok(response.processed)
    }
}

impl CommunityServices for CommunityApiClient {
    fn newsletter_recipients(&self, tenant_id: i64, newsletter_id: &str) -> Result<Vec<String>> {
        let response: RecipientsResponse = self
            .post(
                "newsletter-recipients",
                json!({ "tenant_id": tenant_id, "newsletter_id": newsletter_id }),
            )?
            .json()
            .context("Community API returned malformed recipient list")?;
        Ok(response.recipients)
    }

    fn store_coordinates(
        &self,
        tenant_id: i64,
        entity_kind: &str,
        entity_id: i64,
        point: GeoPoint,
    ) -> Result<()> {
        self.post(
            "store-coordinates",
            json!({
                "tenant_id": tenant_id,
                "entity_kind": entity_kind,
                "entity_id": entity_id,
                "lat": point.lat,
                "lon": point.lon,
            }),
        )?;
        Ok(())
    }

    fn notify_hot_matches(&self, tenant_id: i64) -> Result<usize> {
        self.call("notify-hot-matches", tenant_id)
    }

    fn send_match_digests(&self, tenant_id: i64, frequency: Frequency) -> Result<usize> {
        self.call_with(
            "send-match-digests",
            json!({ "tenant_id": tenant_id, "frequency": frequency.as_str() }),
        )
    }

    fn warm_match_cache(&self, tenant_id: i64) -> Result<usize> {
        self.call("warm-match-cache", tenant_id)
    }

    fn run_gamification_daily(&self, tenant_id: i64) -> Result<usize> {
        self.call("gamification-daily", tenant_id)
    }

    fn process_campaigns(&self, tenant_id: i64) -> Result<usize> {
        self.call("gamification-campaigns", tenant_id)
    }

    fn check_challenges(&self, tenant_id: i64) -> Result<usize> {
        self.call("gamification-challenges", tenant_id)
    }

    fn snapshot_leaderboards(&self, tenant_id: i64) -> Result<usize> {
        self.call("leaderboard-snapshot", tenant_id)
    }

    fn send_gamification_weekly(&self, tenant_id: i64) -> Result<usize> {
        self.call("gamification-weekly-digest", tenant_id)
    }

    fn update_featured_groups(&self, tenant_id: i64) -> Result<usize> {
        self.call("update-featured-groups", tenant_id)
    }

    fn send_group_digests(&self, tenant_id: i64) -> Result<usize> {
        self.call("group-digests", tenant_id)
    }

    fn send_federation_digests(&self, tenant_id: i64) -> Result<usize> {
        self.call("federation-digests", tenant_id)
    }

    fn send_event_reminders(&self, tenant_id: i64) -> Result<usize> {
        self.call("event-reminders", tenant_id)
    }

    fn scan_for_abuse(&self, tenant_id: i64) -> Result<usize> {
        self.call("abuse-scan", tenant_id)
    }

    fn reconcile_wallets(&self, tenant_id: i64) -> Result<usize> {
        self.call("wallet-reconciliation", tenant_id)
    }

    fn cleanup_expired(&self, tenant_id: i64) -> Result<usize> {
        self.call("cleanup-expired", tenant_id)
    }
}

/// Reports zero work for every operation. Used when the community API is not
/// configured and in tests.
pub struct NullCommunityServices;

impl CommunityServices for NullCommunityServices {
    fn newsletter_recipients(&self, _tenant_id: i64, _newsletter_id: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn store_coordinates(
        &self,
        _tenant_id: i64,
        _entity_kind: &str,
        _entity_id: i64,
        _point: GeoPoint,
    ) -> Result<()> {
        Ok(())
    }

    fn notify_hot_matches(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }

    fn send_match_digests(&self, _tenant_id: i64, _frequency: Frequency) -> Result<usize> {
        Ok(0)
    }

    fn warm_match_cache(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }

    fn run_gamification_daily(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }

    fn process_campaigns(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }

    fn check_challenges(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }

    fn snapshot_leaderboards(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }

    fn send_gamification_weekly(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }

    fn update_featured_groups(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }

    fn send_group_digests(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }

    fn send_federation_digests(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }

    fn send_event_reminders(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }

    fn scan_for_abuse(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }

    fn reconcile_wallets(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }

    fn cleanup_expired(&self, _tenant_id: i64) -> Result<usize> {
        Ok(0)
    }
}
