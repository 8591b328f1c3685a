//! Gamification maintenance. The XP/badge/leaderboard rules live in the
//! platform; these handlers drive the cadence per tenant.

use super::run_for_tenants;
use crate::cron::context::CronContext;
use crate::cron::job::{CronJob, JobError};
use crate::cron::schedule::{weekday, Schedule};
use crate::services::CommunityServices;

/// Recurring achievement campaigns.
pub struct CampaignsJob;

impl CronJob for CampaignsJob {
    fn id(&self) -> &'static str {
        "gamification-campaigns"
    }

    fn name(&self) -> &'static str {
        "Process Achievement Campaigns"
    }

    fn description(&self) -> &'static str {
        "Processes recurring achievement campaigns and awards badges/XP to qualifying users"
    }

    fn schedule(&self) -> Schedule {
        Schedule::HourlyAt(0)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "campaign awards", |tenant| {
            ctx.services.community.process_campaigns(tenant.id)
        })
    }
}

/// Challenge expirations, offset to :30 to stay clear of the on-the-hour work.
pub struct ChallengesJob;

impl CronJob for ChallengesJob {
    fn id(&self) -> &'static str {
        "check-challenges"
    }

    fn name(&self) -> &'static str {
        "Check Challenge Expirations"
    }

    fn description(&self) -> &'static str {
        "Expires completed challenges and updates friend challenge statuses"
    }

    fn schedule(&self) -> Schedule {
        Schedule::HourlyAt(30)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "challenge updates", |tenant| {
            ctx.services.community.check_challenges(tenant.id)
        })
    }
}

/// Streak resets, daily bonuses and badge checks.
pub struct GamificationDailyJob;

impl CronJob for GamificationDailyJob {
    fn id(&self) -> &'static str {
        "gamification-daily"
    }

    fn name(&self) -> &'static str {
        "Gamification Daily Tasks"
    }

    fn description(&self) -> &'static str {
        "Processes streak resets, daily bonuses and badge checks for recently active users"
    }

    fn schedule(&self) -> Schedule {
        Schedule::DailyAt(3)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "daily gamification updates", |tenant| {
            ctx.services.community.run_gamification_daily(tenant.id)
        })
    }
}

/// Daily leaderboard snapshots and season finalization.
pub struct LeaderboardSnapshotJob;

impl CronJob for LeaderboardSnapshotJob {
    fn id(&self) -> &'static str {
        "leaderboard-snapshot"
    }

    fn name(&self) -> &'static str {
        "Leaderboard Snapshot"
    }

    fn description(&self) -> &'static str {
        "Creates daily leaderboard snapshots and finalizes ended seasons with rewards"
    }

    fn schedule(&self) -> Schedule {
        Schedule::DailyAt(0)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "leaderboard snapshots", |tenant| {
            ctx.services.community.snapshot_leaderboards(tenant.id)
        })
    }
}

/// Weekly progress emails.
pub struct GamificationWeeklyJob;

impl CronJob for GamificationWeeklyJob {
    fn id(&self) -> &'static str {
        "gamification-weekly-digest"
    }

    fn name(&self) -> &'static str {
        "Gamification Weekly Digest"
    }

    fn description(&self) -> &'static str {
        "Sends weekly progress email digests to users who earned XP or badges"
    }

    fn schedule(&self) -> Schedule {
        Schedule::WeeklyAt(weekday::MONDAY, 4)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "weekly progress digests", |tenant| {
            ctx.services.community.send_gamification_weekly(tenant.id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::schedule::TickTime;
    use crate::cron::testutil::{tenant_store_at, test_context_with, StubCommunity};
    use crate::services::Services;
    use std::sync::Arc;

    #[test]
    fn each_job_drives_its_own_operation() {
        let community = StubCommunity::new();
        let services = Services {
            community: Arc::clone(&community) as Arc<dyn crate::services::CommunityServices>,
            ..Services::null()
        };
        let (ctx, dir) = test_context_with(TickTime::new(0, 3, 1), false, services);
        tenant_store_at(&dir)
            .insert_tenant("brighton", "Brighton Timebank")
            .unwrap();

        CampaignsJob.execute(&ctx).unwrap();
        ChallengesJob.execute(&ctx).unwrap();
        GamificationDailyJob.execute(&ctx).unwrap();
        LeaderboardSnapshotJob.execute(&ctx).unwrap();
        GamificationWeeklyJob.execute(&ctx).unwrap();

        for op in [
            "gamification-campaigns",
            "gamification-challenges",
            "gamification-daily",
            "leaderboard-snapshot",
            "gamification-weekly-digest",
        ] {
            assert_eq!(community.calls_for(op).len(), 1, "missing call for {}", op);
        }
    }
}
