use super::context::CronContext;
use super::job::{CronJob, JobError};
use super::run_logger::RunLogger;
use super::schedule::TickTime;
use crate::cron_store::{CronStore, LockAcquire, RunStatus};
use crate::server::metrics;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

/// Name of the advisory lock guarding against overlapping ticks.
pub const DISPATCHER_LOCK: &str = "dispatcher";

/// The orchestrator entry point.
///
/// Holds the static job table in declared priority order. One external
/// trigger maps to one [`Dispatcher::run_all`] call: evaluate the schedule
/// predicates once, execute every due job inside its own failure boundary,
/// and hand the aggregate trace to the run logger. The declared order only
/// affects trace readability; no job may rely on another job's side effects
/// within the same tick.
pub struct Dispatcher {
    jobs: Vec<Arc<dyn CronJob>>,
    logger: RunLogger,
}

impl Dispatcher {
    pub fn new(jobs: Vec<Arc<dyn CronJob>>, cron_store: Arc<dyn CronStore>) -> Self {
        Self {
            jobs,
            logger: RunLogger::new(cron_store),
        }
    }

    pub fn jobs(&self) -> &[Arc<dyn CronJob>] {
        &self.jobs
    }

    pub fn find(&self, id: &str) -> Option<Arc<dyn CronJob>> {
        self.jobs.iter().find(|job| job.id() == id).cloned()
    }

    /// Jobs due at `tick`, in declared order.
    pub fn due_jobs(&self, tick: TickTime) -> Vec<Arc<dyn CronJob>> {
        self.jobs
            .iter()
            .filter(|job| job.schedule().is_due(tick))
            .cloned()
            .collect()
    }

    /// The master tick: run every due job and log one aggregate run record.
    pub fn run_all(&self, ctx: &CronContext) -> RunStatus {
        let handle = self.logger.start("run-all", ctx.nested, None);

        // Outermost boundary: even a panic outside any job boundary still
        // produces a best-effort log entry with whatever was traced.
        let status = match catch_unwind(AssertUnwindSafe(|| self.run_all_inner(ctx))) {
            Ok(status) => status,
            Err(_) => {
                ctx.say("Fatal: dispatcher panicked outside any job boundary");
                RunStatus::Error
            }
        };

        handle.finish(status, &ctx.output());
        status
    }

    fn run_all_inner(&self, ctx: &CronContext) -> RunStatus {
        let holder = format!("pid-{}-{}", std::process::id(), Uuid::new_v4());
        match ctx
            .cron_store
            .try_acquire_lock(DISPATCHER_LOCK, &holder, ctx.settings.lock_stale_after)
        {
            Ok(LockAcquire::Acquired) => {}
            Ok(LockAcquire::Held {
                holder: held_by,
                since,
            }) => {
                // Not an error: the previous tick is simply still running.
                ctx.say(format!(
                    "Previous run still active (held by {} since {}), skipping this tick",
                    held_by,
                    since.to_rfc3339()
                ));
                info!("Dispatcher tick skipped, lock held by {}", held_by);
                return RunStatus::Success;
            }
            Err(err) => {
                ctx.say(format!("Fatal: could not take the dispatcher lock: {:#}", err));
                return RunStatus::Error;
            }
        }

        metrics::record_tick();
        ctx.say("=== Hourbank cron runner ===");
        ctx.say(format!(
            "Time: {} (minute {}, hour {}, weekday {})",
            ctx.now.to_rfc3339(),
            ctx.tick.minute,
            ctx.tick.hour,
            ctx.tick.weekday
        ));

        let due = self.due_jobs(ctx.tick);
        let mut any_failed = false;
        for (index, job) in due.iter().enumerate() {
            ctx.say(format!("\n[{}] {} ({})", index + 1, job.name(), job.id()));
            if !self.execute_with_boundary(job, ctx) {
                any_failed = true;
            }
        }

        if let Err(err) = ctx.cron_store.release_lock(DISPATCHER_LOCK, &holder) {
            // The staleness window will eventually break an unreleased lock.
            error!("Failed to release dispatcher lock: {:#}", err);
        }

        ctx.say(format!("\n=== Cron run complete ({} jobs) ===", due.len()));
        if any_failed {
            RunStatus::Error
        } else {
            RunStatus::Success
        }
    }

    /// Run a single job under its own run record. Used by the per-job
    /// trigger endpoints and the CLI.
    pub fn run_job(&self, job_id: &str, ctx: &CronContext) -> Result<RunStatus, JobError> {
        let job = self.find(job_id).ok_or(JobError::NotFound)?;

        let handle = self.logger.start(job.id(), ctx.nested, None);
        ctx.say(format!("{} ({})", job.name(), job.id()));
        let status = if self.execute_with_boundary(&job, ctx) {
            RunStatus::Success
        } else {
            RunStatus::Error
        };
        handle.finish(status, &ctx.output());
        Ok(status)
    }

    /// Execute one job inside its failure boundary. An error or panic is
    /// absorbed into the trace so subsequent due jobs still run.
    fn execute_with_boundary(&self, job: &Arc<dyn CronJob>, ctx: &CronContext) -> bool {
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| job.execute(ctx)));
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(())) => {
                metrics::record_job_execution(job.id(), "success", elapsed);
                true
            }
            Ok(Err(err)) => {
                ctx.say(format!("  error: {}", err));
                error!("Job {} failed after {:?}: {}", job.id(), elapsed, err);
                metrics::record_job_execution(job.id(), "error", elapsed);
                false
            }
            Err(_) => {
                ctx.say("  error: job panicked");
                error!("Job {} panicked after {:?}", job.id(), elapsed);
                metrics::record_job_execution(job.id(), "panic", elapsed);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::schedule::{weekday, Schedule};
    use crate::cron::testutil::{cron_store_at, test_context};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedJob {
        id: &'static str,
        schedule: Schedule,
        executions: Arc<AtomicUsize>,
        behavior: Behavior,
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Panic,
    }

    impl ScriptedJob {
        fn new(id: &'static str, schedule: Schedule, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                id,
                schedule,
                executions: Arc::new(AtomicUsize::new(0)),
                behavior,
            })
        }
    }

    impl CronJob for ScriptedJob {
        fn id(&self) -> &'static str {
            self.id
        }
        fn name(&self) -> &'static str {
            "Scripted Job"
        }
        fn description(&self) -> &'static str {
            "test double"
        }
        fn schedule(&self) -> Schedule {
            self.schedule
        }
        fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            ctx.say(format!("  {} ran", self.id));
            match self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::Fail => Err(JobError::failed("scripted failure")),
                Behavior::Panic => panic!("scripted panic"),
            }
        }
    }

    fn dispatcher_with(
        jobs: Vec<Arc<ScriptedJob>>,
        cron_store: Arc<dyn CronStore>,
    ) -> Dispatcher {
        let jobs = jobs
            .into_iter()
            .map(|job| job as Arc<dyn CronJob>)
            .collect();
        Dispatcher::new(jobs, cron_store)
    }

    #[test]
    fn due_jobs_preserve_declared_order() {
        let (ctx, dir) = test_context(TickTime::new(0, 0, weekday::SUNDAY), false);
        let jobs = vec![
            ScriptedJob::new("third", Schedule::EveryTick, Behavior::Succeed),
            ScriptedJob::new("first", Schedule::EveryTick, Behavior::Succeed),
            ScriptedJob::new("second", Schedule::EveryTick, Behavior::Succeed),
        ];
        let dispatcher = dispatcher_with(jobs, Arc::new(cron_store_at(&dir)));

        dispatcher.run_all(&ctx);
        let output = ctx.output();
        let third = output.find("third ran").unwrap();
        let first = output.find("first ran").unwrap();
        let second = output.find("second ran").unwrap();
        assert!(third < first && first < second);
    }

    #[test]
    fn due_set_converges_at_sunday_midnight() {
        let (_ctx, dir) = test_context(TickTime::new(0, 0, weekday::SUNDAY), false);
        let jobs = vec![
            ScriptedJob::new("tick", Schedule::EveryTick, Behavior::Succeed),
            ScriptedJob::new("five", Schedule::EveryMinutes(5), Behavior::Succeed),
            ScriptedJob::new("fifteen", Schedule::EveryMinutes(15), Behavior::Succeed),
            ScriptedJob::new("thirty", Schedule::EveryMinutes(30), Behavior::Succeed),
            ScriptedJob::new("hourly", Schedule::HourlyAt(0), Behavior::Succeed),
            ScriptedJob::new("half-past", Schedule::HourlyAt(30), Behavior::Succeed),
            ScriptedJob::new("midnight", Schedule::DailyAt(0), Behavior::Succeed),
            ScriptedJob::new("morning", Schedule::DailyAt(8), Behavior::Succeed),
            ScriptedJob::new(
                "sunday",
                Schedule::WeeklyAt(weekday::SUNDAY, 0),
                Behavior::Succeed,
            ),
        ];
        let dispatcher = dispatcher_with(jobs, Arc::new(cron_store_at(&dir)));

        let due: Vec<&str> = dispatcher
            .due_jobs(TickTime::new(0, 0, weekday::SUNDAY))
            .iter()
            .map(|job| job.id())
            .collect();
        assert_eq!(
            due,
            vec!["tick", "five", "fifteen", "thirty", "hourly", "midnight", "sunday"]
        );
    }

    #[test]
    fn a_failing_job_does_not_stop_later_jobs() {
        let (ctx, dir) = test_context(TickTime::new(0, 12, weekday::TUESDAY), false);
        let failing = ScriptedJob::new("failing", Schedule::EveryTick, Behavior::Fail);
        let healthy = ScriptedJob::new("healthy", Schedule::EveryTick, Behavior::Succeed);
        let healthy_runs = Arc::clone(&healthy.executions);
        let cron_store: Arc<dyn CronStore> = Arc::new(cron_store_at(&dir));
        let dispatcher = dispatcher_with(vec![failing, healthy], Arc::clone(&cron_store));

        let status = dispatcher.run_all(&ctx);

        assert_eq!(status, RunStatus::Error);
        assert_eq!(healthy_runs.load(Ordering::SeqCst), 1);
        let output = ctx.output();
        assert!(output.contains("scripted failure"));
        assert!(output.contains("healthy ran"));

        // The aggregate run record carries the error status and full trace.
        let runs = cron_store.recent_runs(Some("run-all"), 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Error);
        assert!(runs[0].output.contains("healthy ran"));
    }

    #[test]
    fn a_panicking_job_is_contained() {
        let (ctx, dir) = test_context(TickTime::new(0, 12, weekday::TUESDAY), false);
        let panicking = ScriptedJob::new("panicking", Schedule::EveryTick, Behavior::Panic);
        let healthy = ScriptedJob::new("healthy", Schedule::EveryTick, Behavior::Succeed);
        let healthy_runs = Arc::clone(&healthy.executions);
        let dispatcher =
            dispatcher_with(vec![panicking, healthy], Arc::new(cron_store_at(&dir)));

        let status = dispatcher.run_all(&ctx);

        assert_eq!(status, RunStatus::Error);
        assert_eq!(healthy_runs.load(Ordering::SeqCst), 1);
        assert!(ctx.output().contains("job panicked"));
    }

    #[test]
    fn held_lock_skips_the_tick_cleanly() {
        let (ctx, dir) = test_context(TickTime::new(0, 12, weekday::TUESDAY), false);
        let cron_store: Arc<dyn CronStore> = Arc::new(cron_store_at(&dir));
        cron_store
            .try_acquire_lock(DISPATCHER_LOCK, "other-invocation", Duration::from_secs(600))
            .unwrap();

        let job = ScriptedJob::new("tick", Schedule::EveryTick, Behavior::Succeed);
        let runs = Arc::clone(&job.executions);
        let dispatcher = dispatcher_with(vec![job], Arc::clone(&cron_store));

        let status = dispatcher.run_all(&ctx);

        assert_eq!(status, RunStatus::Success);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(ctx.output().contains("still active"));
    }

    #[test]
    fn lock_is_released_between_ticks() {
        let (ctx_a, dir) = test_context(TickTime::new(0, 12, weekday::TUESDAY), false);
        let job = ScriptedJob::new("tick", Schedule::EveryTick, Behavior::Succeed);
        let runs = Arc::clone(&job.executions);
        let dispatcher = dispatcher_with(vec![job], Arc::new(cron_store_at(&dir)));

        dispatcher.run_all(&ctx_a);
        // Second tick over the same databases must not see a held lock.
        let ctx_b = crate::cron::testutil::context_in(&dir, TickTime::new(1, 12, weekday::TUESDAY), false);
        dispatcher.run_all(&ctx_b);

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(!ctx_b.output().contains("still active"));
    }

    #[test]
    fn nested_run_writes_no_run_records() {
        let (ctx, dir) = test_context(TickTime::new(0, 12, weekday::TUESDAY), true);
        let cron_store: Arc<dyn CronStore> = Arc::new(cron_store_at(&dir));
        let failing = ScriptedJob::new("failing", Schedule::EveryTick, Behavior::Fail);
        let dispatcher = dispatcher_with(vec![failing], Arc::clone(&cron_store));

        let status = dispatcher.run_all(&ctx);

        // Failure or success, a nested run leaves no rows behind.
        assert_eq!(status, RunStatus::Error);
        assert!(cron_store.recent_runs(None, 10).unwrap().is_empty());
    }

    #[test]
    fn run_job_unknown_id_is_not_found() {
        let (ctx, dir) = test_context(TickTime::new(0, 12, weekday::TUESDAY), false);
        let dispatcher = dispatcher_with(vec![], Arc::new(cron_store_at(&dir)));
        match dispatcher.run_job("no-such-job", &ctx) {
            Err(JobError::NotFound) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn run_job_logs_under_its_own_id() {
        let (ctx, dir) = test_context(TickTime::new(7, 12, weekday::TUESDAY), false);
        let cron_store: Arc<dyn CronStore> = Arc::new(cron_store_at(&dir));
        let job = ScriptedJob::new("cleanup", Schedule::DailyAt(0), Behavior::Succeed);
        let dispatcher = dispatcher_with(vec![job], Arc::clone(&cron_store));

        // Out-of-schedule single runs are allowed; the schedule only gates
        // the master tick.
        let status = dispatcher.run_job("cleanup", &ctx).unwrap();
        assert_eq!(status, RunStatus::Success);

        let runs = cron_store.recent_runs(Some("cleanup"), 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Success);
    }
}
