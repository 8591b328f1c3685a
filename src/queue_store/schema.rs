//! SQLite schema for the queue database.
//!
//! Queue rows are produced by the platform's request handling and consumed by
//! the cron jobs; single-row status updates are the only writes the consumers
//! perform, so partial progress is always safe to resume.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Notification, newsletter and geocode queues
// =============================================================================

const NOTIFICATION_QUEUE_TABLE_V1: Table = Table {
    name: "notification_queue",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("tenant_id", &SqlType::Integer, non_null = true),
        sqlite_column!("user_id", &SqlType::Integer, non_null = true),
        sqlite_column!("recipient", &SqlType::Text, non_null = true),
        sqlite_column!("frequency", &SqlType::Text, non_null = true),
        sqlite_column!("activity_type", &SqlType::Text, non_null = true),
        sqlite_column!("subject", &SqlType::Text),
        sqlite_column!("body", &SqlType::Text),
        sqlite_column!("link", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("claimed_at", &SqlType::Text),
        sqlite_column!("sent_at", &SqlType::Text),
    ],
    indices: &[
        (
            "idx_notification_queue_drain",
            "tenant_id, frequency, status, created_at",
        ),
        ("idx_notification_queue_status", "status"),
    ],
};

const NEWSLETTERS_TABLE_V1: Table = Table {
    name: "newsletters",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true), // UUID
        sqlite_column!("tenant_id", &SqlType::Integer, non_null = true),
        sqlite_column!("subject", &SqlType::Text, non_null = true),
        sqlite_column!("body", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("scheduled_at", &SqlType::Text),
        sqlite_column!("recur_days", &SqlType::Integer),
        sqlite_column!("last_sent_at", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_newsletters_tenant_status", "tenant_id, status")],
};

const NEWSLETTER_QUEUE_TABLE_V1: Table = Table {
    name: "newsletter_queue",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("tenant_id", &SqlType::Integer, non_null = true),
        sqlite_column!("newsletter_id", &SqlType::Text, non_null = true),
        sqlite_column!("recipient", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("claimed_at", &SqlType::Text),
        sqlite_column!("sent_at", &SqlType::Text),
    ],
    indices: &[
        (
            "idx_newsletter_queue_drain",
            "newsletter_id, status, created_at",
        ),
        ("idx_newsletter_queue_tenant", "tenant_id, status"),
    ],
};

const GEOCODE_QUEUE_TABLE_V1: Table = Table {
    name: "geocode_queue",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("tenant_id", &SqlType::Integer, non_null = true),
        sqlite_column!("entity_kind", &SqlType::Text, non_null = true),
        sqlite_column!("entity_id", &SqlType::Integer, non_null = true),
        sqlite_column!("address", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("claimed_at", &SqlType::Text),
        sqlite_column!("sent_at", &SqlType::Text),
    ],
    indices: &[("idx_geocode_queue_drain", "tenant_id, status, created_at")],
};

/// All versioned schemas for the queue database.
pub const QUEUE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        NOTIFICATION_QUEUE_TABLE_V1,
        NEWSLETTERS_TABLE_V1,
        NEWSLETTER_QUEUE_TABLE_V1,
        GEOCODE_QUEUE_TABLE_V1,
    ],
    migration: None,
}];
