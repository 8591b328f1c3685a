//! Community event reminders.

use super::run_for_tenants;
use crate::cron::context::CronContext;
use crate::cron::job::{CronJob, JobError};
use crate::cron::schedule::Schedule;
use crate::services::CommunityServices;

pub struct EventRemindersJob;

impl CronJob for EventRemindersJob {
    fn id(&self) -> &'static str {
        "event-reminders"
    }

    fn name(&self) -> &'static str {
        "Event Reminders"
    }

    fn description(&self) -> &'static str {
        "Sends reminders to attendees of upcoming community events"
    }

    fn schedule(&self) -> Schedule {
        Schedule::DailyAt(7)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "event reminders", |tenant| {
            ctx.services.community.send_event_reminders(tenant.id)
        })
    }
}
