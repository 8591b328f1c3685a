//! Federation digests for users connected to partner timebanks.

use super::run_for_tenants;
use crate::cron::context::CronContext;
use crate::cron::job::{CronJob, JobError};
use crate::cron::schedule::{weekday, Schedule};
use crate::services::CommunityServices;

pub struct FederationDigestJob;

impl CronJob for FederationDigestJob {
    fn id(&self) -> &'static str {
        "federation-weekly-digest"
    }

    fn name(&self) -> &'static str {
        "Federation Weekly Digest"
    }

    fn description(&self) -> &'static str {
        "Sends weekly federation activity summaries to users who opted in"
    }

    fn schedule(&self) -> Schedule {
        Schedule::WeeklyAt(weekday::MONDAY, 9)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "federation digests", |tenant| {
            ctx.services.community.send_federation_digests(tenant.id)
        })
    }
}
