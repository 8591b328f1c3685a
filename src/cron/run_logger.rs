use crate::cron_store::{CronStore, RunStatus};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Run records are capped at 65 000 characters of captured output.
pub const MAX_RUN_OUTPUT_CHARS: usize = 65_000;

/// Writes the durable run log.
///
/// `start` returns a handle that is a no-op for nested invocations (the
/// enclosing caller owns its own run record). `finish` consumes the handle,
/// so a run can never be finalized twice.
pub struct RunLogger {
    store: Arc<dyn CronStore>,
}

impl RunLogger {
    pub fn new(store: Arc<dyn CronStore>) -> Self {
        Self { store }
    }

    pub fn start(&self, job_id: &str, nested: bool, executed_by: Option<&str>) -> RunHandle {
        if nested {
            return RunHandle { started: None };
        }
        match self.store.record_run_start(job_id, executed_by, None) {
            Ok(run_id) => RunHandle {
                started: Some(StartedRun {
                    store: Arc::clone(&self.store),
                    job_id: job_id.to_string(),
                    run_id,
                    started_at: Instant::now(),
                }),
            },
            Err(err) => {
                // Best effort: a failing run log must not block the jobs.
                error!("Failed to record run start for {}: {:#}", job_id, err);
                RunHandle { started: None }
            }
        }
    }
}

pub struct RunHandle {
    started: Option<StartedRun>,
}

struct StartedRun {
    store: Arc<dyn CronStore>,
    job_id: String,
    run_id: i64,
    started_at: Instant,
}

impl RunHandle {
    /// Finalize the run record with elapsed duration and truncated output.
    pub fn finish(self, status: RunStatus, output: &str) {
        let Some(run) = self.started else {
            return;
        };
        let duration = run.started_at.elapsed().as_secs_f64();
        let output = truncate_output(output);
        if let Err(err) = run
            .store
            .record_run_finish(run.run_id, status, output, duration)
        {
            error!("Failed to record run finish for {}: {:#}", run.job_id, err);
        }
    }
}

pub(crate) fn truncate_output(output: &str) -> &str {
    match output.char_indices().nth(MAX_RUN_OUTPUT_CHARS) {
        Some((byte_index, _)) => &output[..byte_index],
        None => output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron_store::SqliteCronStore;
    use tempfile::TempDir;

    fn test_logger() -> (RunLogger, Arc<dyn CronStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store: Arc<dyn CronStore> =
            Arc::new(SqliteCronStore::new(temp_dir.path().join("cron.db")).unwrap());
        (RunLogger::new(Arc::clone(&store)), store, temp_dir)
    }

    #[test]
    fn start_finish_writes_one_record() {
        let (logger, store, _dir) = test_logger();

        let handle = logger.start("cleanup", false, None);
        handle.finish(RunStatus::Success, "done\n");

        let runs = store.recent_runs(Some("cleanup"), 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].output, "done\n");
        assert!(runs[0].duration_seconds.is_some());
    }

    #[test]
    fn nested_runs_write_nothing() {
        let (logger, store, _dir) = test_logger();

        let handle = logger.start("cleanup", true, None);
        handle.finish(RunStatus::Error, "should not be persisted");

        assert!(store.recent_runs(None, 10).unwrap().is_empty());
    }

    #[test]
    fn executed_by_is_recorded() {
        let (logger, store, _dir) = test_logger();

        let handle = logger.start("cleanup", false, Some("admin-api"));
        handle.finish(RunStatus::Success, "");

        let runs = store.recent_runs(None, 10).unwrap();
        assert_eq!(runs[0].executed_by.as_deref(), Some("admin-api"));
    }

    #[test]
    fn oversized_output_is_truncated() {
        let (logger, store, _dir) = test_logger();

        let big = "x".repeat(MAX_RUN_OUTPUT_CHARS + 500);
        let handle = logger.start("cleanup", false, None);
        handle.finish(RunStatus::Success, &big);

        let runs = store.recent_runs(None, 10).unwrap();
        assert_eq!(runs[0].output.chars().count(), MAX_RUN_OUTPUT_CHARS);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let multibyte = "é".repeat(MAX_RUN_OUTPUT_CHARS + 10);
        let truncated = truncate_output(&multibyte);
        assert_eq!(truncated.chars().count(), MAX_RUN_OUTPUT_CHARS);
    }
}
