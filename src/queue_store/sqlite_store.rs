use super::models::*;
use super::schema::QUEUE_VERSIONED_SCHEMAS;
use super::QueueStore;
use crate::sqlite_persistence::open_database;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const NOTIFICATION_COLUMNS: &str = "id, tenant_id, user_id, recipient, frequency, activity_type, \
     subject, body, link, status, error, created_at, sent_at";
const NEWSLETTER_COLUMNS: &str =
    "id, tenant_id, subject, body, status, scheduled_at, recur_days, last_sent_at, created_at";
const NEWSLETTER_ITEM_COLUMNS: &str =
    "id, tenant_id, newsletter_id, recipient, status, error, created_at, sent_at";
const GEOCODE_COLUMNS: &str =
    "id, tenant_id, entity_kind, entity_id, address, status, error, created_at, sent_at";

pub struct SqliteQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteQueueStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_database(db_path, QUEUE_VERSIONED_SCHEMAS, "queue")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    fn get_datetime(row: &rusqlite::Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
        let raw: String = row.get(column)?;
        Ok(Self::parse_datetime(&raw).unwrap_or_else(Utc::now))
    }

    fn get_opt_datetime(
        row: &rusqlite::Row,
        column: &str,
    ) -> rusqlite::Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = row.get(column)?;
        Ok(raw.as_deref().and_then(Self::parse_datetime))
    }

    fn row_to_notification(row: &rusqlite::Row) -> rusqlite::Result<NotificationItem> {
        let frequency: String = row.get("frequency")?;
        let status: String = row.get("status")?;
        Ok(NotificationItem {
            id: row.get("id")?,
            tenant_id: row.get("tenant_id")?,
            user_id: row.get("user_id")?,
            recipient: row.get("recipient")?,
            frequency: Frequency::parse(&frequency).unwrap_or(Frequency::Instant),
            activity_type: row.get("activity_type")?,
            subject: row.get("subject")?,
            body: row.get("body")?,
            link: row.get("link")?,
            status: QueueStatus::parse(&status).unwrap_or(QueueStatus::Failed),
            error: row.get("error")?,
            created_at: Self::get_datetime(row, "created_at")?,
            sent_at: Self::get_opt_datetime(row, "sent_at")?,
        })
    }

    fn row_to_newsletter(row: &rusqlite::Row) -> rusqlite::Result<Newsletter> {
        let status: String = row.get("status")?;
        Ok(Newsletter {
            id: row.get("id")?,
            tenant_id: row.get("tenant_id")?,
            subject: row.get("subject")?,
            body: row.get("body")?,
            status: NewsletterStatus::parse(&status).unwrap_or(NewsletterStatus::Draft),
            scheduled_at: Self::get_opt_datetime(row, "scheduled_at")?,
            recur_days: row.get("recur_days")?,
            last_sent_at: Self::get_opt_datetime(row, "last_sent_at")?,
            created_at: Self::get_datetime(row, "created_at")?,
        })
    }

    fn row_to_newsletter_item(row: &rusqlite::Row) -> rusqlite::Result<NewsletterItem> {
        let status: String = row.get("status")?;
        Ok(NewsletterItem {
            id: row.get("id")?,
            tenant_id: row.get("tenant_id")?,
            newsletter_id: row.get("newsletter_id")?,
            recipient: row.get("recipient")?,
            status: QueueStatus::parse(&status).unwrap_or(QueueStatus::Failed),
            error: row.get("error")?,
            created_at: Self::get_datetime(row, "created_at")?,
            sent_at: Self::get_opt_datetime(row, "sent_at")?,
        })
    }

    fn row_to_geocode(row: &rusqlite::Row) -> rusqlite::Result<GeocodeItem> {
        let status: String = row.get("status")?;
        Ok(GeocodeItem {
            id: row.get("id")?,
            tenant_id: row.get("tenant_id")?,
            entity_kind: row.get("entity_kind")?,
            entity_id: row.get("entity_id")?,
            address: row.get("address")?,
            status: QueueStatus::parse(&status).unwrap_or(QueueStatus::Failed),
            error: row.get("error")?,
            created_at: Self::get_datetime(row, "created_at")?,
            sent_at: Self::get_opt_datetime(row, "sent_at")?,
        })
    }

    /// Flip the oldest matching pending rows to claimed inside one
    /// transaction, returning the claimed ids in creation order.
    fn claim_ids(
        conn: &mut Connection,
        table: &str,
        where_sql: &str,
        where_params: &[&dyn rusqlite::ToSql],
        limit: usize,
    ) -> Result<Vec<i64>> {
        let tx = conn.transaction()?;
        let now = Self::format_datetime(&Utc::now());

        let ids: Vec<i64> = {
            let sql = format!(
                "SELECT id FROM {} WHERE {} AND status = 'pending'
                 ORDER BY created_at ASC, id ASC LIMIT {}",
                table, where_sql, limit
            );
            let mut stmt = tx.prepare(&sql)?;
            let ids = stmt
                .query_map(where_params, |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;
            ids
        };

        for id in &ids {
            tx.execute(
                &format!(
                    "UPDATE {} SET status = 'claimed', claimed_at = ?1
                     WHERE id = ?2 AND status = 'pending'",
                    table
                ),
                params![now, id],
            )?;
        }

        tx.commit()?;
        Ok(ids)
    }

    /// `claimed → sent|failed`. The status guard keeps finalized rows
    /// immutable even if a mark is retried.
    fn finalize_item(
        &self,
        table: &str,
        id: i64,
        status: QueueStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Self::format_datetime(&Utc::now());
        conn.execute(
            &format!(
                "UPDATE {} SET status = ?1, error = ?2, sent_at = ?3, claimed_at = NULL
                 WHERE id = ?4 AND status = 'claimed'",
                table
            ),
            params![status.as_str(), error, now, id],
        )?;
        Ok(())
    }
}

impl QueueStore for SqliteQueueStore {
    fn enqueue_notification(&self, item: NewNotification) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = Self::format_datetime(&Utc::now());
        conn.execute(
            "INSERT INTO notification_queue
             (tenant_id, user_id, recipient, frequency, activity_type, subject, body, link, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                item.tenant_id,
                item.user_id,
                item.recipient,
                item.frequency.as_str(),
                item.activity_type,
                item.subject,
                item.body,
                item.link,
                QueueStatus::Pending.as_str(),
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn claim_notifications(
        &self,
        tenant_id: i64,
        frequency: Frequency,
        limit: usize,
    ) -> Result<Vec<NotificationItem>> {
        let ids = {
            let mut conn = self.conn.lock().unwrap();
            Self::claim_ids(
                &mut conn,
                "notification_queue",
                "tenant_id = ?1 AND frequency = ?2",
                &[&tenant_id, &frequency.as_str()],
                limit,
            )?
        };

        let conn = self.conn.lock().unwrap();
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let item = conn.query_row(
                &format!(
                    "SELECT {} FROM notification_queue WHERE id = ?1",
                    NOTIFICATION_COLUMNS
                ),
                params![id],
                Self::row_to_notification,
            )?;
            items.push(item);
        }
        Ok(items)
    }

    fn pending_notifications_remain(&self, tenant_id: i64, frequency: Frequency) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notification_queue
             WHERE tenant_id = ?1 AND frequency = ?2 AND status = 'pending'",
            params![tenant_id, frequency.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn mark_notification_sent(&self, id: i64) -> Result<()> {
        self.finalize_item("notification_queue", id, QueueStatus::Sent, None)
    }

    fn mark_notification_failed(&self, id: i64, error: &str) -> Result<()> {
        self.finalize_item("notification_queue", id, QueueStatus::Failed, Some(error))
    }

    fn create_newsletter(&self, newsletter: Newsletter) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO newsletters
             (id, tenant_id, subject, body, status, scheduled_at, recur_days, last_sent_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                newsletter.id,
                newsletter.tenant_id,
                newsletter.subject,
                newsletter.body,
                newsletter.status.as_str(),
                newsletter.scheduled_at.as_ref().map(Self::format_datetime),
                newsletter.recur_days,
                newsletter.last_sent_at.as_ref().map(Self::format_datetime),
                Self::format_datetime(&newsletter.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_newsletter(&self, id: &str) -> Result<Option<Newsletter>> {
        let conn = self.conn.lock().unwrap();
        let newsletter = conn
            .query_row(
                &format!("SELECT {} FROM newsletters WHERE id = ?1", NEWSLETTER_COLUMNS),
                params![id],
                Self::row_to_newsletter,
            )
            .optional()?;
        Ok(newsletter)
    }

    fn due_scheduled_newsletters(
        &self,
        tenant_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Newsletter>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM newsletters
             WHERE tenant_id = ?1 AND status = 'scheduled'
               AND scheduled_at IS NOT NULL AND scheduled_at <= ?2
             ORDER BY scheduled_at ASC",
            NEWSLETTER_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![tenant_id, Self::format_datetime(&now)],
                Self::row_to_newsletter,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn due_recurring_newsletters(
        &self,
        tenant_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Newsletter>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM newsletters
             WHERE tenant_id = ?1 AND status = 'sent' AND recur_days IS NOT NULL
               AND (last_sent_at IS NULL
                    OR julianday(?2) - julianday(last_sent_at) >= recur_days)
             ORDER BY created_at ASC",
            NEWSLETTER_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![tenant_id, Self::format_datetime(&now)],
                Self::row_to_newsletter,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn set_newsletter_status(&self, id: &str, status: NewsletterStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE newsletters SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    fn mark_newsletter_sent(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE newsletters SET status = ?1, last_sent_at = ?2 WHERE id = ?3",
            params![
                NewsletterStatus::Sent.as_str(),
                Self::format_datetime(&now),
                id
            ],
        )?;
        Ok(())
    }

    fn enqueue_newsletter_recipients(
        &self,
        newsletter_id: &str,
        tenant_id: i64,
        recipients: &[String],
    ) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Self::format_datetime(&Utc::now());
        for recipient in recipients {
            tx.execute(
                "INSERT INTO newsletter_queue
                 (tenant_id, newsletter_id, recipient, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    tenant_id,
                    newsletter_id,
                    recipient,
                    QueueStatus::Pending.as_str(),
                    now
                ],
            )?;
        }
        tx.commit()?;
        Ok(recipients.len())
    }

    fn sending_newsletter_ids(&self, tenant_id: i64, limit: usize) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id FROM newsletters
             WHERE tenant_id = ?1 AND status = 'sending'
             ORDER BY created_at ASC LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![tenant_id, limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn claim_newsletter_items(
        &self,
        newsletter_id: &str,
        limit: usize,
    ) -> Result<Vec<NewsletterItem>> {
        let ids = {
            let mut conn = self.conn.lock().unwrap();
            Self::claim_ids(
                &mut conn,
                "newsletter_queue",
                "newsletter_id = ?1",
                &[&newsletter_id],
                limit,
            )?
        };

        let conn = self.conn.lock().unwrap();
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let item = conn.query_row(
                &format!(
                    "SELECT {} FROM newsletter_queue WHERE id = ?1",
                    NEWSLETTER_ITEM_COLUMNS
                ),
                params![id],
                Self::row_to_newsletter_item,
            )?;
            items.push(item);
        }
        Ok(items)
    }

    fn pending_newsletter_items_remain(&self, newsletter_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM newsletter_queue
             WHERE newsletter_id = ?1 AND status = 'pending'",
            params![newsletter_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn mark_newsletter_item_sent(&self, id: i64) -> Result<()> {
        self.finalize_item("newsletter_queue", id, QueueStatus::Sent, None)
    }

    fn mark_newsletter_item_failed(&self, id: i64, error: &str) -> Result<()> {
        self.finalize_item("newsletter_queue", id, QueueStatus::Failed, Some(error))
    }

    fn enqueue_geocode(&self, item: NewGeocodeItem) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = Self::format_datetime(&Utc::now());
        conn.execute(
            "INSERT INTO geocode_queue
             (tenant_id, entity_kind, entity_id, address, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.tenant_id,
                item.entity_kind,
                item.entity_id,
                item.address,
                QueueStatus::Pending.as_str(),
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn claim_geocode_items(&self, tenant_id: i64, limit: usize) -> Result<Vec<GeocodeItem>> {
        let ids = {
            let mut conn = self.conn.lock().unwrap();
            Self::claim_ids(
                &mut conn,
                "geocode_queue",
                "tenant_id = ?1",
                &[&tenant_id],
                limit,
            )?
        };

        let conn = self.conn.lock().unwrap();
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let item = conn.query_row(
                &format!("SELECT {} FROM geocode_queue WHERE id = ?1", GEOCODE_COLUMNS),
                params![id],
                Self::row_to_geocode,
            )?;
            items.push(item);
        }
        Ok(items)
    }

    fn pending_geocode_items_remain(&self, tenant_id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM geocode_queue WHERE tenant_id = ?1 AND status = 'pending'",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn mark_geocode_item_sent(&self, id: i64) -> Result<()> {
        self.finalize_item("geocode_queue", id, QueueStatus::Sent, None)
    }

    fn mark_geocode_item_failed(&self, id: i64, error: &str) -> Result<()> {
        self.finalize_item("geocode_queue", id, QueueStatus::Failed, Some(error))
    }

    fn release_stale_claims(&self, older_than: Duration) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Self::format_datetime(&cutoff);

        let mut released = 0;
        for table in ["notification_queue", "newsletter_queue", "geocode_queue"] {
            released += conn.execute(
                &format!(
                    "UPDATE {} SET status = 'pending', claimed_at = NULL
                     WHERE status = 'claimed' AND claimed_at < ?1",
                    table
                ),
                params![cutoff],
            )?;
        }
        Ok(released)
    }

    fn delete_terminal_items_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let cutoff = Self::format_datetime(&cutoff);

        let mut deleted = 0;
        for table in ["notification_queue", "newsletter_queue", "geocode_queue"] {
            deleted += conn.execute(
                &format!(
                    "DELETE FROM {} WHERE status IN ('sent', 'failed')
                     AND COALESCE(sent_at, created_at) < ?1",
                    table
                ),
                params![cutoff],
            )?;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct TestStore {
        store: SqliteQueueStore,
        _temp_dir: TempDir, // keep the temp dir alive
    }

    fn create_test_store() -> TestStore {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteQueueStore::new(temp_dir.path().join("queue.db")).unwrap();
        TestStore {
            store,
            _temp_dir: temp_dir,
        }
    }

    fn notification(tenant_id: i64, user_id: i64, frequency: Frequency) -> NewNotification {
        NewNotification {
            tenant_id,
            user_id,
            recipient: format!("user{}@example.org", user_id),
            frequency,
            activity_type: "new_topic".to_string(),
            subject: None,
            body: Some("A new discussion was started".to_string()),
            link: Some("/forum/topics/42".to_string()),
        }
    }

    #[test]
    fn claim_respects_tenant_frequency_and_order() {
        let test = create_test_store();
        let store = &test.store;

        let first = store
            .enqueue_notification(notification(1, 10, Frequency::Instant))
            .unwrap();
        let second = store
            .enqueue_notification(notification(1, 11, Frequency::Instant))
            .unwrap();
        store
            .enqueue_notification(notification(1, 12, Frequency::Daily))
            .unwrap();
        store
            .enqueue_notification(notification(2, 13, Frequency::Instant))
            .unwrap();

        let claimed = store.claim_notifications(1, Frequency::Instant, 10).unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].id, first);
        assert_eq!(claimed[1].id, second);
        assert!(claimed.iter().all(|i| i.status == QueueStatus::Claimed));

        // A second claim must not see the same rows.
        let again = store.claim_notifications(1, Frequency::Instant, 10).unwrap();
        assert!(again.is_empty());

        // The daily and other-tenant rows are untouched.
        assert!(store.pending_notifications_remain(1, Frequency::Daily).unwrap());
        assert!(store
            .pending_notifications_remain(2, Frequency::Instant)
            .unwrap());
    }

    #[test]
    fn claim_respects_limit() {
        let test = create_test_store();
        let store = &test.store;

        for i in 0..5 {
            store
                .enqueue_notification(notification(1, i, Frequency::Instant))
                .unwrap();
        }

        let claimed = store.claim_notifications(1, Frequency::Instant, 2).unwrap();
        assert_eq!(claimed.len(), 2);
        assert!(store
            .pending_notifications_remain(1, Frequency::Instant)
            .unwrap());
    }

    #[test]
    fn finalized_rows_stay_finalized() {
        let test = create_test_store();
        let store = &test.store;

        let id = store
            .enqueue_notification(notification(1, 10, Frequency::Instant))
            .unwrap();
        let claimed = store.claim_notifications(1, Frequency::Instant, 10).unwrap();
        assert_eq!(claimed.len(), 1);

        store.mark_notification_sent(id).unwrap();
        // A late failure mark must not overwrite the terminal state.
        store.mark_notification_failed(id, "late error").unwrap();

        let again = store.claim_notifications(1, Frequency::Instant, 10).unwrap();
        assert!(again.is_empty());
        assert!(!store
            .pending_notifications_remain(1, Frequency::Instant)
            .unwrap());
    }

    #[test]
    fn failed_rows_keep_error() {
        let test = create_test_store();
        let store = &test.store;

        let id = store
            .enqueue_notification(notification(1, 10, Frequency::Instant))
            .unwrap();
        store.claim_notifications(1, Frequency::Instant, 10).unwrap();
        store.mark_notification_failed(id, "mail relay refused").unwrap();

        // Failed rows are not pending and are not re-claimed.
        assert!(!store
            .pending_notifications_remain(1, Frequency::Instant)
            .unwrap());
        assert!(store
            .claim_notifications(1, Frequency::Instant, 10)
            .unwrap()
            .is_empty());
    }

    fn newsletter(id: &str, tenant_id: i64, status: NewsletterStatus) -> Newsletter {
        Newsletter {
            id: id.to_string(),
            tenant_id,
            subject: "Community news".to_string(),
            body: "Hello neighbours".to_string(),
            status,
            scheduled_at: None,
            recur_days: None,
            last_sent_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn scheduled_newsletters_become_due() {
        let test = create_test_store();
        let store = &test.store;
        let now = Utc::now();

        let mut due = newsletter("nl-due", 1, NewsletterStatus::Scheduled);
        due.scheduled_at = Some(now - chrono::Duration::minutes(5));
        store.create_newsletter(due).unwrap();

        let mut future = newsletter("nl-future", 1, NewsletterStatus::Scheduled);
        future.scheduled_at = Some(now + chrono::Duration::hours(1));
        store.create_newsletter(future).unwrap();

        store
            .create_newsletter(newsletter("nl-draft", 1, NewsletterStatus::Draft))
            .unwrap();

        let due = store.due_scheduled_newsletters(1, now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "nl-due");
    }

    #[test]
    fn recurring_newsletters_become_due_after_interval() {
        let test = create_test_store();
        let store = &test.store;
        let now = Utc::now();

        let mut weekly = newsletter("nl-weekly", 1, NewsletterStatus::Sent);
        weekly.recur_days = Some(7);
        weekly.last_sent_at = Some(now - chrono::Duration::days(8));
        store.create_newsletter(weekly).unwrap();

        let mut fresh = newsletter("nl-fresh", 1, NewsletterStatus::Sent);
        fresh.recur_days = Some(7);
        fresh.last_sent_at = Some(now - chrono::Duration::days(2));
        store.create_newsletter(fresh).unwrap();

        let due = store.due_recurring_newsletters(1, now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "nl-weekly");
    }

    #[test]
    fn newsletter_queue_claim_and_finalize_cycle() {
        let test = create_test_store();
        let store = &test.store;

        store
            .create_newsletter(newsletter("nl-1", 1, NewsletterStatus::Sending))
            .unwrap();
        let recipients: Vec<String> = (0..3).map(|i| format!("r{}@example.org", i)).collect();
        let inserted = store
            .enqueue_newsletter_recipients("nl-1", 1, &recipients)
            .unwrap();
        assert_eq!(inserted, 3);

        assert_eq!(store.sending_newsletter_ids(1, 10).unwrap(), vec!["nl-1"]);

        let claimed = store.claim_newsletter_items("nl-1", 2).unwrap();
        assert_eq!(claimed.len(), 2);
        assert!(store.pending_newsletter_items_remain("nl-1").unwrap());

        for item in &claimed {
            store.mark_newsletter_item_sent(item.id).unwrap();
        }
        let rest = store.claim_newsletter_items("nl-1", 10).unwrap();
        assert_eq!(rest.len(), 1);
        store.mark_newsletter_item_sent(rest[0].id).unwrap();
        assert!(!store.pending_newsletter_items_remain("nl-1").unwrap());

        store.mark_newsletter_sent("nl-1", Utc::now()).unwrap();
        let finished = store.get_newsletter("nl-1").unwrap().unwrap();
        assert_eq!(finished.status, NewsletterStatus::Sent);
        assert!(finished.last_sent_at.is_some());
        assert!(store.sending_newsletter_ids(1, 10).unwrap().is_empty());
    }

    #[test]
    fn geocode_queue_roundtrip() {
        let test = create_test_store();
        let store = &test.store;

        let id = store
            .enqueue_geocode(NewGeocodeItem {
                tenant_id: 1,
                entity_kind: "listing".to_string(),
                entity_id: 77,
                address: "12 Harbour Lane, Brighton".to_string(),
            })
            .unwrap();

        let claimed = store.claim_geocode_items(1, 10).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, id);
        assert_eq!(claimed[0].entity_kind, "listing");

        store.mark_geocode_item_failed(id, "no match").unwrap();
        assert!(!store.pending_geocode_items_remain(1).unwrap());
    }

    #[test]
    fn stale_claims_are_released() {
        let test = create_test_store();
        let store = &test.store;

        store
            .enqueue_notification(notification(1, 10, Frequency::Instant))
            .unwrap();
        let claimed = store.claim_notifications(1, Frequency::Instant, 10).unwrap();
        assert_eq!(claimed.len(), 1);

        // Claims newer than the threshold stay claimed.
        assert_eq!(
            store.release_stale_claims(Duration::from_secs(3600)).unwrap(),
            0
        );
        // A zero threshold releases everything.
        assert_eq!(store.release_stale_claims(Duration::ZERO).unwrap(), 1);
        assert!(store
            .pending_notifications_remain(1, Frequency::Instant)
            .unwrap());
    }

    #[test]
    fn terminal_rows_are_deleted_by_retention() {
        let test = create_test_store();
        let store = &test.store;

        let id = store
            .enqueue_notification(notification(1, 10, Frequency::Instant))
            .unwrap();
        store.claim_notifications(1, Frequency::Instant, 10).unwrap();
        store.mark_notification_sent(id).unwrap();

        let kept = store
            .delete_terminal_items_before(Utc::now() - chrono::Duration::days(30))
            .unwrap();
        assert_eq!(kept, 0);

        let deleted = store
            .delete_terminal_items_before(Utc::now() + chrono::Duration::days(1))
            .unwrap();
        assert_eq!(deleted, 1);
    }
}
