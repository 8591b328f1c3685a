//! Smart-matching jobs. Scoring and digest rendering live in the platform's
//! community services; these handlers only schedule the work per tenant.

use super::run_for_tenants;
use crate::cron::context::CronContext;
use crate::cron::job::{CronJob, JobError};
use crate::cron::schedule::{weekday, Schedule};
use crate::queue_store::Frequency;
use crate::services::CommunityServices;

/// Notifies users of new high-scoring matches from recent listings.
pub struct HotMatchesJob;

impl CronJob for HotMatchesJob {
    fn id(&self) -> &'static str {
        "notify-hot-matches"
    }

    fn name(&self) -> &'static str {
        "Hot Match Notifications"
    }

    fn description(&self) -> &'static str {
        "Notifies users of new high-scoring matches based on recently created listings"
    }

    fn schedule(&self) -> Schedule {
        Schedule::HourlyAt(0)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "hot match notifications", |tenant| {
            ctx.services.community.notify_hot_matches(tenant.id)
        })
    }
}

/// Daily match recommendations for users on the daily cadence.
pub struct MatchDigestDailyJob;

impl CronJob for MatchDigestDailyJob {
    fn id(&self) -> &'static str {
        "match-digest-daily"
    }

    fn name(&self) -> &'static str {
        "Daily Match Digest"
    }

    fn description(&self) -> &'static str {
        "Sends daily match recommendations to users who opted for daily match notifications"
    }

    fn schedule(&self) -> Schedule {
        Schedule::DailyAt(9)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "daily match digests", |tenant| {
            ctx.services
                .community
                .send_match_digests(tenant.id, Frequency::Daily)
        })
    }
}

/// Weekly match recommendation summary.
pub struct MatchDigestWeeklyJob;

impl CronJob for MatchDigestWeeklyJob {
    fn id(&self) -> &'static str {
        "match-digest-weekly"
    }

    fn name(&self) -> &'static str {
        "Weekly Match Digest"
    }

    fn description(&self) -> &'static str {
        "Sends weekly match recommendation summaries"
    }

    fn schedule(&self) -> Schedule {
        Schedule::WeeklyAt(weekday::MONDAY, 9)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "weekly match digests", |tenant| {
            ctx.services
                .community
                .send_match_digests(tenant.id, Frequency::Weekly)
        })
    }
}

/// Precomputes match scores so dashboard queries stay fast.
pub struct WarmMatchCacheJob;

impl CronJob for WarmMatchCacheJob {
    fn id(&self) -> &'static str {
        "warm-match-cache"
    }

    fn name(&self) -> &'static str {
        "Warm Match Cache"
    }

    fn description(&self) -> &'static str {
        "Precomputes match scores into the match cache during the quiet hours"
    }

    fn schedule(&self) -> Schedule {
        Schedule::DailyAt(1)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "match cache entries", |tenant| {
            ctx.services.community.warm_match_cache(tenant.id)
        })
    }
}
