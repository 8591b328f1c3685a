//! Group management jobs.

use super::run_for_tenants;
use crate::cron::context::CronContext;
use crate::cron::job::{CronJob, JobError};
use crate::cron::schedule::{weekday, Schedule};
use crate::services::CommunityServices;

/// Re-ranks featured groups from member count, engagement and geography.
pub struct FeaturedGroupsJob;

impl CronJob for FeaturedGroupsJob {
    fn id(&self) -> &'static str {
        "update-featured-groups"
    }

    fn name(&self) -> &'static str {
        "Update Featured Groups"
    }

    fn description(&self) -> &'static str {
        "Updates featured groups based on member count, engagement score and geographic spread"
    }

    fn schedule(&self) -> Schedule {
        Schedule::DailyAt(8)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "featured groups updated", |tenant| {
            ctx.services.community.update_featured_groups(tenant.id)
        })
    }
}

/// Weekly analytics digest for group owners.
pub struct GroupDigestJob;

impl CronJob for GroupDigestJob {
    fn id(&self) -> &'static str {
        "group-weekly-digest"
    }

    fn name(&self) -> &'static str {
        "Group Weekly Digests"
    }

    fn description(&self) -> &'static str {
        "Sends weekly analytics digests to group owners with growth and engagement stats"
    }

    fn schedule(&self) -> Schedule {
        Schedule::WeeklyAt(weekday::MONDAY, 9)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "group digests", |tenant| {
            ctx.services.community.send_group_digests(tenant.id)
        })
    }
}
