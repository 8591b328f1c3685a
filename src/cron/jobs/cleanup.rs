//! Nightly maintenance: stranded claims, delivered queue rows, old run log
//! entries and expired platform records.

use super::run_for_tenants;
use crate::cron::context::CronContext;
use crate::cron::job::{CronJob, JobError};
use crate::cron::schedule::Schedule;
use crate::cron_store::CronStore;
use crate::queue_store::QueueStore;
use crate::services::CommunityServices;

pub struct CleanupJob;

impl CronJob for CleanupJob {
    fn id(&self) -> &'static str {
        "cleanup"
    }

    fn name(&self) -> &'static str {
        "System Cleanup"
    }

    fn description(&self) -> &'static str {
        "Releases stranded queue claims, prunes delivered queue rows and old run log entries, \
         and drops expired platform records"
    }

    fn schedule(&self) -> Schedule {
        Schedule::DailyAt(0)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        let released = ctx
            .queue_store
            .release_stale_claims(ctx.settings.claim_stale_after)
            .map_err(JobError::from)?;
        ctx.say(format!(" - released {} stale queue claims", released));

        let queue_cutoff =
            ctx.now - chrono::Duration::days(ctx.settings.sent_retention_days as i64);
        let deleted = ctx
            .queue_store
            .delete_terminal_items_before(queue_cutoff)
            .map_err(JobError::from)?;
        ctx.say(format!(" - removed {} delivered queue rows", deleted));

        let run_cutoff =
            ctx.now - chrono::Duration::days(ctx.settings.run_log_retention_days as i64);
        let pruned = ctx
            .cron_store
            .prune_runs_before(run_cutoff)
            .map_err(JobError::from)?;
        ctx.say(format!(" - pruned {} old run log entries", pruned));

        run_for_tenants(ctx, "expired platform records", |tenant| {
            ctx.services.community.cleanup_expired(tenant.id)
        })
    }
}
