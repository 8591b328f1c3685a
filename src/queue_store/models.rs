use chrono::{DateTime, Utc};

/// Lifecycle of a queue row.
///
/// `pending → claimed → sent | failed`. The `claimed` state is an atomic
/// reservation taken by the drain engine so that overlapping invocations
/// cannot pick up the same row; terminal rows are never reprocessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Pending,
    Claimed,
    Sent,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Claimed => "claimed",
            QueueStatus::Sent => "sent",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "claimed" => Some(QueueStatus::Claimed),
            "sent" => Some(QueueStatus::Sent),
            "failed" => Some(QueueStatus::Failed),
            _ => None,
        }
    }
}

/// Delivery cadence a user opted into for their notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Instant,
    Daily,
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Instant => "instant",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "instant" => Some(Frequency::Instant),
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            _ => None,
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending notification produced by the platform's request handling.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub tenant_id: i64,
    pub user_id: i64,
    pub recipient: String,
    pub frequency: Frequency,
    pub activity_type: String,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub link: Option<String>,
}

/// A notification queue row.
#[derive(Debug, Clone)]
pub struct NotificationItem {
    pub id: i64,
    pub tenant_id: i64,
    pub user_id: i64,
    pub recipient: String,
    pub frequency: Frequency,
    pub activity_type: String,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub link: Option<String>,
    pub status: QueueStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Send state of a newsletter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsletterStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
}

impl NewsletterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewsletterStatus::Draft => "draft",
            NewsletterStatus::Scheduled => "scheduled",
            NewsletterStatus::Sending => "sending",
            NewsletterStatus::Sent => "sent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(NewsletterStatus::Draft),
            "scheduled" => Some(NewsletterStatus::Scheduled),
            "sending" => Some(NewsletterStatus::Sending),
            "sent" => Some(NewsletterStatus::Sent),
            _ => None,
        }
    }
}

/// A newsletter authored in the platform's admin UI.
#[derive(Debug, Clone)]
pub struct Newsletter {
    pub id: String,
    pub tenant_id: i64,
    pub subject: String,
    pub body: String,
    pub status: NewsletterStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// For recurring newsletters: days between sends. `None` for one-shots.
    pub recur_days: Option<i64>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One recipient of one newsletter send.
#[derive(Debug, Clone)]
pub struct NewsletterItem {
    pub id: i64,
    pub tenant_id: i64,
    pub newsletter_id: String,
    pub recipient: String,
    pub status: QueueStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// An entity waiting for coordinates.
#[derive(Debug, Clone)]
pub struct NewGeocodeItem {
    pub tenant_id: i64,
    /// "user" or "listing"
    pub entity_kind: String,
    pub entity_id: i64,
    pub address: String,
}

/// A geocode queue row.
#[derive(Debug, Clone)]
pub struct GeocodeItem {
    pub id: i64,
    pub tenant_id: i64,
    pub entity_kind: String,
    pub entity_id: i64,
    pub address: String,
    pub status: QueueStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_status_roundtrip() {
        for status in [
            QueueStatus::Pending,
            QueueStatus::Claimed,
            QueueStatus::Sent,
            QueueStatus::Failed,
        ] {
            assert_eq!(QueueStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(QueueStatus::parse(""), None);
    }

    #[test]
    fn frequency_roundtrip() {
        for freq in [Frequency::Instant, Frequency::Daily, Frequency::Weekly] {
            assert_eq!(Frequency::parse(freq.as_str()), Some(freq));
        }
        assert_eq!(Frequency::parse("hourly"), None);
    }

    #[test]
    fn newsletter_status_roundtrip() {
        for status in [
            NewsletterStatus::Draft,
            NewsletterStatus::Scheduled,
            NewsletterStatus::Sending,
            NewsletterStatus::Sent,
        ] {
            assert_eq!(NewsletterStatus::parse(status.as_str()), Some(status));
        }
    }
}
