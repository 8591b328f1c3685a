//! Timebanking abuse detection.

use super::run_for_tenants;
use crate::cron::context::CronContext;
use crate::cron::job::{CronJob, JobError};
use crate::cron::schedule::{weekday, Schedule};
use crate::services::CommunityServices;

pub struct AbuseScanJob;

impl CronJob for AbuseScanJob {
    fn id(&self) -> &'static str {
        "abuse-scan"
    }

    fn name(&self) -> &'static str {
        "Timebanking Abuse Detection"
    }

    fn description(&self) -> &'static str {
        "Scans transactions for abuse patterns and raises alerts for admin review"
    }

    fn schedule(&self) -> Schedule {
        Schedule::WeeklyAt(weekday::SUNDAY, 2)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "abuse alerts", |tenant| {
            ctx.services.community.scan_for_abuse(tenant.id)
        })
    }
}
