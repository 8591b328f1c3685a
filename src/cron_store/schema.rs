//! SQLite schema for the cron database: run history, orchestrator state and
//! the advisory dispatcher lock.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Run log and orchestrator state
// =============================================================================

/// History of job executions. Append-only; rows are finalized once and never
/// mutated afterwards.
const JOB_RUNS_TABLE_V1: Table = Table {
    name: "job_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("job_id", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("output", &SqlType::Text),
        sqlite_column!("duration_seconds", &SqlType::Real),
        sqlite_column!("executed_at", &SqlType::Text, non_null = true),
        sqlite_column!("executed_by", &SqlType::Text),
        sqlite_column!("tenant_id", &SqlType::Integer),
    ],
    indices: &[
        ("idx_job_runs_job_id_executed", "job_id, executed_at DESC"),
        ("idx_job_runs_executed_at", "executed_at DESC"),
        ("idx_job_runs_status", "status"),
    ],
};

/// Key-value store for orchestrator state.
const CRON_STATE_TABLE_V1: Table = Table {
    name: "cron_state",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

// =============================================================================
// Version 2 - Advisory locks
// =============================================================================

/// Advisory locks with a staleness timeout. One row per lock name while held.
const CRON_LOCKS_TABLE_V2: Table = Table {
    name: "cron_locks",
    columns: &[
        sqlite_column!("name", &SqlType::Text, is_primary_key = true),
        sqlite_column!("holder", &SqlType::Text, non_null = true),
        sqlite_column!("acquired_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE cron_locks (
            name TEXT PRIMARY KEY,
            holder TEXT NOT NULL,
            acquired_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// All versioned schemas for the cron database.
///
/// Version 1: job_runs and cron_state
/// Version 2: cron_locks
pub const CRON_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[JOB_RUNS_TABLE_V1, CRON_STATE_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[JOB_RUNS_TABLE_V1, CRON_STATE_TABLE_V1, CRON_LOCKS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];
