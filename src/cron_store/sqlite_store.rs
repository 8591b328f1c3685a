use super::models::{JobRun, JobRunStats, LockAcquire, RunStatus};
use super::schema::CRON_VERSIONED_SCHEMAS;
use super::CronStore;
use crate::sqlite_persistence::open_database;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct SqliteCronStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCronStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_database(db_path, CRON_VERSIONED_SCHEMAS, "cron")?;
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

    fn row_to_job_run(row: &rusqlite::Row) -> rusqlite::Result<JobRun> {
        let status_str: String = row.get("status")?;
        let executed_at_str: String = row.get("executed_at")?;
        let output: Option<String> = row.get("output")?;

        Ok(JobRun {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            status: RunStatus::parse(&status_str).unwrap_or(RunStatus::Error),
            output: output.unwrap_or_default(),
            duration_seconds: row.get("duration_seconds")?,
            executed_at: Self::parse_datetime(&executed_at_str).unwrap_or_else(Utc::now),
            executed_by: row.get("executed_by")?,
            tenant_id: row.get("tenant_id")?,
        })
    }
}

impl CronStore for SqliteCronStore {
    fn record_run_start(
        &self,
        job_id: &str,
        executed_by: Option<&str>,
        tenant_id: Option<i64>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = Self::format_datetime(&Utc::now());

        conn.execute(
            "INSERT INTO job_runs (job_id, status, executed_at, executed_by, tenant_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job_id,
                RunStatus::Running.as_str(),
                now,
                executed_by,
                tenant_id
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn record_run_finish(
        &self,
        run_id: i64,
        status: RunStatus,
        output: &str,
        duration_seconds: f64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE job_runs SET status = ?1, output = ?2, duration_seconds = ?3 WHERE id = ?4",
            params![status.as_str(), output, duration_seconds, run_id],
        )?;
        Ok(())
    }

    fn recent_runs(&self, job_id: Option<&str>, limit: usize) -> Result<Vec<JobRun>> {
        let conn = self.conn.lock().unwrap();
        let runs = match job_id {
            Some(job_id) => {
                let mut stmt = conn.prepare(
                    "SELECT id, job_id, status, output, duration_seconds, executed_at, executed_by, tenant_id
                     FROM job_runs WHERE job_id = ?1 ORDER BY executed_at DESC, id DESC LIMIT ?2",
                )?;
                let runs = stmt
                    .query_map(params![job_id, limit as i64], Self::row_to_job_run)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                runs
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, job_id, status, output, duration_seconds, executed_at, executed_by, tenant_id
                     FROM job_runs ORDER BY executed_at DESC, id DESC LIMIT ?1",
                )?;
                let runs = stmt
                    .query_map(params![limit as i64], Self::row_to_job_run)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                runs
            }
        };
        Ok(runs)
    }

    fn job_stats(&self, since: DateTime<Utc>) -> Result<Vec<JobRunStats>> {
        let conn = self.conn.lock().unwrap();
        let since = Self::format_datetime(&since);

        let mut stmt = conn.prepare(
            "SELECT job_id,
                    MAX(executed_at) as last_run,
                    SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END) as success_count,
                    SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END) as error_count,
                    COUNT(*) as total_runs,
                    AVG(COALESCE(duration_seconds, 0)) as avg_duration
             FROM job_runs
             WHERE executed_at > ?1
             GROUP BY job_id",
        )?;

        let mut stats = stmt
            .query_map(params![since], |row| {
                let last_run: Option<String> = row.get("last_run")?;
                Ok(JobRunStats {
                    job_id: row.get("job_id")?,
                    last_run: last_run.as_deref().and_then(Self::parse_datetime),
                    last_status: None,
                    success_count: row.get("success_count")?,
                    error_count: row.get("error_count")?,
                    total_runs: row.get("total_runs")?,
                    avg_duration_seconds: row.get("avg_duration")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for entry in &mut stats {
            let status: Option<String> = conn
                .query_row(
                    "SELECT status FROM job_runs WHERE job_id = ?1
                     ORDER BY executed_at DESC, id DESC LIMIT 1",
                    params![entry.job_id],
                    |row| row.get(0),
                )
                .optional()?;
            entry.last_status = status.as_deref().and_then(RunStatus::parse);
        }

        Ok(stats)
    }

    fn mark_stale_runs_failed(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        // Finalizes runs interrupted by a restart; called once at startup.
        let count = conn.execute(
            "UPDATE job_runs SET status = ?1, output = ?2 WHERE status = ?3",
            params![
                RunStatus::Error.as_str(),
                "Run was interrupted (server restart)",
                RunStatus::Running.as_str()
            ],
        )?;
        Ok(count)
    }

    fn prune_runs_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let cutoff = Self::format_datetime(&cutoff);
        let deleted = conn.execute(
            "DELETE FROM job_runs WHERE executed_at < ?1 AND status != ?2",
            params![cutoff, RunStatus::Running.as_str()],
        )?;
        Ok(deleted)
    }

    fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM cron_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Self::format_datetime(&Utc::now());
        conn.execute(
            "INSERT INTO cron_state (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn delete_state(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM cron_state WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn try_acquire_lock(
        &self,
        name: &str,
        holder: &str,
        stale_after: Duration,
    ) -> Result<LockAcquire> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();

        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT holder, acquired_at FROM cron_locks WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let acquire = match existing {
            None => {
                tx.execute(
                    "INSERT INTO cron_locks (name, holder, acquired_at) VALUES (?1, ?2, ?3)",
                    params![name, holder, Self::format_datetime(&now)],
                )?;
                LockAcquire::Acquired
            }
            Some((current_holder, acquired_at_str)) => {
                let acquired_at = Self::parse_datetime(&acquired_at_str).unwrap_or(now);
                let age = (now - acquired_at).to_std().unwrap_or(Duration::ZERO);
                if age >= stale_after {
                    // Abandoned lock: take it over.
                    tx.execute(
                        "UPDATE cron_locks SET holder = ?1, acquired_at = ?2 WHERE name = ?3",
                        params![holder, Self::format_datetime(&now), name],
                    )?;
                    LockAcquire::Acquired
                } else {
                    LockAcquire::Held {
                        holder: current_holder,
                        since: acquired_at,
                    }
                }
            }
        };

        tx.commit()?;
        Ok(acquire)
    }

    fn release_lock(&self, name: &str, holder: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM cron_locks WHERE name = ?1 AND holder = ?2",
            params![name, holder],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct TestStore {
        store: SqliteCronStore,
        _temp_dir: TempDir, // keep the temp dir alive
    }

    fn create_test_store() -> TestStore {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteCronStore::new(temp_dir.path().join("cron.db")).unwrap();
        TestStore {
            store,
            _temp_dir: temp_dir,
        }
    }

    #[test]
    fn record_run_start_and_finish() {
        let test = create_test_store();
        let store = &test.store;

        let run_id = store.record_run_start("process-queue", None, None).unwrap();
        assert!(run_id > 0);

        let runs = store.recent_runs(Some("process-queue"), 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Running);
        assert!(runs[0].output.is_empty());

        store
            .record_run_finish(run_id, RunStatus::Success, "Sent 3 notifications.\n", 1.25)
            .unwrap();

        let runs = store.recent_runs(Some("process-queue"), 10).unwrap();
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].output, "Sent 3 notifications.\n");
        assert_eq!(runs[0].duration_seconds, Some(1.25));
        assert!(runs[0].executed_by.is_none());
    }

    #[test]
    fn recent_runs_respects_limit_and_filter() {
        let test = create_test_store();
        let store = &test.store;

        for i in 0..5 {
            let id = store.record_run_start("cleanup", None, None).unwrap();
            store
                .record_run_finish(id, RunStatus::Success, &format!("run {}", i), 0.1)
                .unwrap();
        }
        let other = store.record_run_start("daily-digest", None, None).unwrap();
        store
            .record_run_finish(other, RunStatus::Error, "boom", 0.2)
            .unwrap();

        let cleanup_runs = store.recent_runs(Some("cleanup"), 3).unwrap();
        assert_eq!(cleanup_runs.len(), 3);
        assert!(cleanup_runs.iter().all(|r| r.job_id == "cleanup"));

        let all_runs = store.recent_runs(None, 100).unwrap();
        assert_eq!(all_runs.len(), 6);
    }

    #[test]
    fn job_stats_aggregates() {
        let test = create_test_store();
        let store = &test.store;

        for _ in 0..3 {
            let id = store.record_run_start("geocode-batch", None, None).unwrap();
            store
                .record_run_finish(id, RunStatus::Success, "", 2.0)
                .unwrap();
        }
        let id = store.record_run_start("geocode-batch", None, None).unwrap();
        store.record_run_finish(id, RunStatus::Error, "", 4.0).unwrap();

        let since = Utc::now() - chrono::Duration::days(30);
        let stats = store.job_stats(since).unwrap();
        assert_eq!(stats.len(), 1);
        let entry = &stats[0];
        assert_eq!(entry.job_id, "geocode-batch");
        assert_eq!(entry.success_count, 3);
        assert_eq!(entry.error_count, 1);
        assert_eq!(entry.total_runs, 4);
        assert_eq!(entry.last_status, Some(RunStatus::Error));
        assert!(entry.last_run.is_some());
        assert!((entry.avg_duration_seconds - 2.5).abs() < 1e-9);
    }

    #[test]
    fn mark_stale_runs_failed_finalizes_running_rows() {
        let test = create_test_store();
        let store = &test.store;

        store.record_run_start("run-all", None, None).unwrap();
        store.record_run_start("cleanup", None, None).unwrap();

        let count = store.mark_stale_runs_failed().unwrap();
        assert_eq!(count, 2);

        let runs = store.recent_runs(None, 10).unwrap();
        assert!(runs.iter().all(|r| r.status == RunStatus::Error));
        assert!(runs[0].output.contains("interrupted"));
    }

    #[test]
    fn prune_runs_before_keeps_recent_rows() {
        let test = create_test_store();
        let store = &test.store;

        let id = store.record_run_start("cleanup", None, None).unwrap();
        store.record_run_finish(id, RunStatus::Success, "", 0.1).unwrap();

        let deleted = store
            .prune_runs_before(Utc::now() - chrono::Duration::days(1))
            .unwrap();
        assert_eq!(deleted, 0);

        let deleted = store
            .prune_runs_before(Utc::now() + chrono::Duration::days(1))
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.recent_runs(None, 10).unwrap().is_empty());
    }

    #[test]
    fn state_roundtrip() {
        let test = create_test_store();
        let store = &test.store;

        assert!(store.get_state("last-warmup").unwrap().is_none());
        store.set_state("last-warmup", "2026-01-01").unwrap();
        assert_eq!(
            store.get_state("last-warmup").unwrap().as_deref(),
            Some("2026-01-01")
        );
        store.set_state("last-warmup", "2026-02-01").unwrap();
        assert_eq!(
            store.get_state("last-warmup").unwrap().as_deref(),
            Some("2026-02-01")
        );
        store.delete_state("last-warmup").unwrap();
        assert!(store.get_state("last-warmup").unwrap().is_none());
    }

    #[test]
    fn lock_acquire_and_contention() {
        let test = create_test_store();
        let store = &test.store;
        let stale = Duration::from_secs(600);

        assert_eq!(
            store.try_acquire_lock("dispatcher", "pid-1", stale).unwrap(),
            LockAcquire::Acquired
        );

        match store.try_acquire_lock("dispatcher", "pid-2", stale).unwrap() {
            LockAcquire::Held { holder, .. } => assert_eq!(holder, "pid-1"),
            other => panic!("expected Held, got {:?}", other),
        }

        store.release_lock("dispatcher", "pid-1").unwrap();
        assert_eq!(
            store.try_acquire_lock("dispatcher", "pid-2", stale).unwrap(),
            LockAcquire::Acquired
        );
    }

    #[test]
    fn stale_lock_is_taken_over() {
        let test = create_test_store();
        let store = &test.store;

        store
            .try_acquire_lock("dispatcher", "pid-1", Duration::from_secs(600))
            .unwrap();

        // With a zero staleness window the existing lock is always stale.
        assert_eq!(
            store
                .try_acquire_lock("dispatcher", "pid-2", Duration::ZERO)
                .unwrap(),
            LockAcquire::Acquired
        );

        // pid-1 no longer owns the lock, so its release is a no-op...
        store.release_lock("dispatcher", "pid-1").unwrap();
        match store
            .try_acquire_lock("dispatcher", "pid-3", Duration::from_secs(600))
            .unwrap()
        {
            LockAcquire::Held { holder, .. } => assert_eq!(holder, "pid-2"),
            other => panic!("expected Held, got {:?}", other),
        }
    }
}
