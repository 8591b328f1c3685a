//! Durable orchestrator state: the append-only run log, a small key-value
//! store and the advisory dispatcher lock.

mod models;
mod schema;
mod sqlite_store;

pub use models::{JobRun, JobRunStats, LockAcquire, RunStatus};
pub use sqlite_store::SqliteCronStore;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub trait CronStore: Send + Sync {
    // === Run log ===

    /// Create a `running` run record, returning its id.
    fn record_run_start(
        &self,
        job_id: &str,
        executed_by: Option<&str>,
        tenant_id: Option<i64>,
    ) -> Result<i64>;

    /// Finalize a run record. Called exactly once per started run.
    fn record_run_finish(
        &self,
        run_id: i64,
        status: RunStatus,
        output: &str,
        duration_seconds: f64,
    ) -> Result<()>;

    /// Most recent runs, optionally filtered by job id.
    fn recent_runs(&self, job_id: Option<&str>, limit: usize) -> Result<Vec<JobRun>>;

    /// Per-job aggregates over runs executed after `since`.
    fn job_stats(&self, since: DateTime<Utc>) -> Result<Vec<JobRunStats>>;

    /// Mark any `running` rows as `error`. Called at startup to finalize runs
    /// interrupted by a crash or restart.
    fn mark_stale_runs_failed(&self) -> Result<usize>;

    /// Delete finalized runs executed before `cutoff`. Returns rows deleted.
    fn prune_runs_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    // === Orchestrator state ===

    fn get_state(&self, key: &str) -> Result<Option<String>>;
    fn set_state(&self, key: &str, value: &str) -> Result<()>;
    fn delete_state(&self, key: &str) -> Result<()>;

    // === Advisory locks ===

    /// Try to take the named lock. A lock held longer than `stale_after` is
    /// considered abandoned and taken over.
    fn try_acquire_lock(
        &self,
        name: &str,
        holder: &str,
        stale_after: Duration,
    ) -> Result<LockAcquire>;

    /// Release the named lock if `holder` still owns it.
    fn release_lock(&self, name: &str, holder: &str) -> Result<()>;
}
