//! The job table.
//!
//! One module per functional area, assembled by [`all_jobs`] in declared
//! priority order. The order is documented for log readability only; every
//! job is self-contained and order-independent.

pub mod abuse;
pub mod cleanup;
pub mod digests;
pub mod events;
pub mod federation;
pub mod gamification;
pub mod geocode;
pub mod groups;
pub mod matching;
pub mod newsletters;
pub mod notifications;
pub mod wallet;

pub use abuse::AbuseScanJob;
pub use cleanup::CleanupJob;
pub use digests::{DailyDigestJob, WeeklyDigestJob};
pub use events::EventRemindersJob;
pub use federation::FederationDigestJob;
pub use gamification::{
    CampaignsJob, ChallengesJob, GamificationDailyJob, GamificationWeeklyJob,
    LeaderboardSnapshotJob,
};
pub use geocode::GeocodeBatchJob;
pub use groups::{FeaturedGroupsJob, GroupDigestJob};
pub use matching::{HotMatchesJob, MatchDigestDailyJob, MatchDigestWeeklyJob, WarmMatchCacheJob};
pub use newsletters::{NewsletterQueueJob, RecurringNewslettersJob, ScheduledNewslettersJob};
pub use notifications::InstantQueueJob;
pub use wallet::WalletReconciliationJob;

use super::context::CronContext;
use super::job::{CronJob, JobError};
use super::tenants::for_each_tenant;
use crate::tenant_store::Tenant;
use std::sync::Arc;

/// All jobs in declared priority order:
/// queue drains first, then the frequent schedules, then daily and weekly
/// slots in time-of-day order.
pub fn all_jobs() -> Vec<Arc<dyn CronJob>> {
    vec![
        Arc::new(InstantQueueJob),
        Arc::new(NewsletterQueueJob),
        Arc::new(ScheduledNewslettersJob),
        Arc::new(RecurringNewslettersJob),
        Arc::new(GeocodeBatchJob),
        Arc::new(HotMatchesJob),
        Arc::new(CampaignsJob),
        Arc::new(ChallengesJob),
        Arc::new(CleanupJob),
        Arc::new(LeaderboardSnapshotJob),
        Arc::new(WarmMatchCacheJob),
        Arc::new(GamificationDailyJob),
        Arc::new(EventRemindersJob),
        Arc::new(DailyDigestJob),
        Arc::new(FeaturedGroupsJob),
        Arc::new(MatchDigestDailyJob),
        Arc::new(WeeklyDigestJob),
        Arc::new(AbuseScanJob),
        Arc::new(WalletReconciliationJob),
        Arc::new(GamificationWeeklyJob),
        Arc::new(MatchDigestWeeklyJob),
        Arc::new(GroupDigestJob),
        Arc::new(FederationDigestJob),
    ]
}

/// Run one community operation for every active tenant, tracing per-tenant
/// counts and a final summary line.
pub(crate) fn run_for_tenants<F>(ctx: &CronContext, label: &str, op: F) -> Result<(), JobError>
where
    F: Fn(&Tenant) -> anyhow::Result<usize>,
{
    let mut total = 0usize;
    let summary = for_each_tenant(ctx, |tenant| {
        let processed = op(tenant)?;
        if processed > 0 {
            ctx.say(format!("  {}: {} {}", tenant.slug, processed, label));
        }
        total += processed;
        Ok(())
    })?;
    ctx.say(format!(
        "  {} {} across {} tenants ({} failed)",
        total, label, summary.visited, summary.failed
    ));
    Ok(())
}
