//! Durable work queues consumed by the cron jobs.
//!
//! Three queues share the same lifecycle (`pending → claimed → sent|failed`):
//! the per-user notification queue, the per-recipient newsletter queue and
//! the geocode queue. The newsletter pipeline additionally tracks the
//! newsletters themselves (`scheduled → sending → sent`).

mod models;
mod schema;
mod sqlite_store;

pub use models::{
    Frequency, GeocodeItem, NewGeocodeItem, NewNotification, Newsletter, NewsletterItem,
    NewsletterStatus, NotificationItem, QueueStatus,
};
pub use sqlite_store::SqliteQueueStore;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub trait QueueStore: Send + Sync {
    // === Notification queue ===

    /// Add a notification. Producers are the platform's request handlers.
    fn enqueue_notification(&self, item: NewNotification) -> Result<i64>;

    /// Atomically claim up to `limit` of the oldest pending notifications for
    /// one tenant and frequency (`pending → claimed`).
    fn claim_notifications(
        &self,
        tenant_id: i64,
        frequency: Frequency,
        limit: usize,
    ) -> Result<Vec<NotificationItem>>;

    /// Whether pending notifications remain for this tenant and frequency.
    fn pending_notifications_remain(&self, tenant_id: i64, frequency: Frequency) -> Result<bool>;

    fn mark_notification_sent(&self, id: i64) -> Result<()>;
    fn mark_notification_failed(&self, id: i64, error: &str) -> Result<()>;

    // === Newsletter pipeline ===

    fn create_newsletter(&self, newsletter: Newsletter) -> Result<()>;
    fn get_newsletter(&self, id: &str) -> Result<Option<Newsletter>>;

    /// Scheduled newsletters whose send time has arrived.
    fn due_scheduled_newsletters(&self, tenant_id: i64, now: DateTime<Utc>)
        -> Result<Vec<Newsletter>>;

    /// Recurring newsletters whose interval has elapsed since the last send.
    fn due_recurring_newsletters(&self, tenant_id: i64, now: DateTime<Utc>)
        -> Result<Vec<Newsletter>>;

    fn set_newsletter_status(&self, id: &str, status: NewsletterStatus) -> Result<()>;

    /// Finalize a completed send: `status = sent`, stamp `last_sent_at`.
    fn mark_newsletter_sent(&self, id: &str, now: DateTime<Utc>) -> Result<()>;

    /// Fan a newsletter out to its recipients. Returns rows inserted.
    fn enqueue_newsletter_recipients(
        &self,
        newsletter_id: &str,
        tenant_id: i64,
        recipients: &[String],
    ) -> Result<usize>;

    /// Newsletters in `sending` state that still have queue rows to drain.
    fn sending_newsletter_ids(&self, tenant_id: i64, limit: usize) -> Result<Vec<String>>;

    fn claim_newsletter_items(&self, newsletter_id: &str, limit: usize)
        -> Result<Vec<NewsletterItem>>;
    fn pending_newsletter_items_remain(&self, newsletter_id: &str) -> Result<bool>;
    fn mark_newsletter_item_sent(&self, id: i64) -> Result<()>;
    fn mark_newsletter_item_failed(&self, id: i64, error: &str) -> Result<()>;

    // === Geocode queue ===

    fn enqueue_geocode(&self, item: NewGeocodeItem) -> Result<i64>;
    fn claim_geocode_items(&self, tenant_id: i64, limit: usize) -> Result<Vec<GeocodeItem>>;
    fn pending_geocode_items_remain(&self, tenant_id: i64) -> Result<bool>;
    fn mark_geocode_item_sent(&self, id: i64) -> Result<()>;
    fn mark_geocode_item_failed(&self, id: i64, error: &str) -> Result<()>;

    // === Maintenance ===

    /// Release claims older than `older_than` back to pending, across all
    /// queues. Recovers rows stranded by a killed invocation.
    fn release_stale_claims(&self, older_than: Duration) -> Result<usize>;

    /// Delete sent/failed rows whose terminal timestamp is before `cutoff`.
    fn delete_terminal_items_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
