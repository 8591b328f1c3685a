//! Daily and weekly notification digests.
//!
//! Unlike the instant queue, digests group a user's pending items into one
//! summary email. Batches are still bounded and claimed atomically; a user's
//! items may occasionally straddle two batches and arrive as two emails,
//! which beats holding an unbounded transaction over the whole queue.

use crate::cron::context::CronContext;
use crate::cron::drain::DrainConfig;
use crate::cron::job::{CronJob, JobError};
use crate::cron::schedule::{weekday, Schedule};
use crate::cron::tenants::for_each_tenant;
use crate::queue_store::{Frequency, NotificationItem, QueueStore};
use crate::services::Mailer;
use std::collections::BTreeMap;

fn render_digest(items: &[NotificationItem], frequency: Frequency) -> String {
    let mut body = format!(
        "Here is a summary of what you missed on Hourbank ({} items):\n\n",
        items.len()
    );
    for item in items {
        body.push_str("- ");
        body.push_str(item.body.as_deref().unwrap_or(&item.activity_type));
        if let Some(link) = &item.link {
            body.push_str(" (");
            body.push_str(link);
            body.push(')');
        }
        body.push('\n');
    }
    body.push_str(&format!(
        "\nYou receive this email because you opted for a {} summary.\n",
        frequency
    ));
    body
}

fn process_digest(ctx: &CronContext, frequency: Frequency) -> Result<(), JobError> {
    let config = DrainConfig::from_settings(&ctx.settings);
    let mut digests_sent = 0usize;

    for_each_tenant(ctx, |tenant| {
        loop {
            let batch =
                ctx.queue_store
                    .claim_notifications(tenant.id, frequency, config.batch_size)?;
            if batch.is_empty() {
                break;
            }

            // One email per user, not per item.
            let mut per_user: BTreeMap<(i64, String), Vec<NotificationItem>> = BTreeMap::new();
            for item in batch {
                per_user
                    .entry((item.user_id, item.recipient.clone()))
                    .or_default()
                    .push(item);
            }

            let mut transitioned = 0usize;
            for ((_user_id, recipient), items) in per_user {
                let subject = format!("Your {} digest from Hourbank", frequency);
                let body = render_digest(&items, frequency);
                match ctx.services.mailer.send(&recipient, &subject, &body) {
                    Ok(()) => {
                        for item in &items {
                            if ctx.queue_store.mark_notification_sent(item.id).is_ok() {
                                transitioned += 1;
                            }
                        }
                        digests_sent += 1;
                        ctx.say(format!(
                            "  {}: digest with {} items to {}",
                            tenant.slug,
                            items.len(),
                            recipient
                        ));
                    }
                    Err(err) => {
                        let error = format!("{:#}", err);
                        for item in &items {
                            if ctx
                                .queue_store
                                .mark_notification_failed(item.id, &error)
                                .is_ok()
                            {
                                transitioned += 1;
                            }
                        }
                        ctx.say(format!("  {}: digest to {} failed: {}", tenant.slug, recipient, err));
                    }
                }
            }

            if transitioned == 0 {
                break;
            }
            if !ctx
                .queue_store
                .pending_notifications_remain(tenant.id, frequency)?
            {
                break;
            }
            if !config.pause.is_zero() {
                std::thread::sleep(config.pause);
            }
        }
        Ok(())
    })?;

    if digests_sent == 0 {
        ctx.say(format!("  no pending {} notifications", frequency));
    }
    Ok(())
}

/// Sends the daily digest to users who opted for daily frequency.
pub struct DailyDigestJob;

impl CronJob for DailyDigestJob {
    fn id(&self) -> &'static str {
        "daily-digest"
    }

    fn name(&self) -> &'static str {
        "Daily Digest"
    }

    fn description(&self) -> &'static str {
        "Sends daily notification digest emails to users who opted for daily frequency"
    }

    fn schedule(&self) -> Schedule {
        Schedule::DailyAt(8)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        process_digest(ctx, Frequency::Daily)
    }
}

/// Sends the weekly digest on Friday afternoons.
pub struct WeeklyDigestJob;

impl CronJob for WeeklyDigestJob {
    fn id(&self) -> &'static str {
        "weekly-digest"
    }

    fn name(&self) -> &'static str {
        "Weekly Digest"
    }

    fn description(&self) -> &'static str {
        "Sends weekly notification digest emails"
    }

    fn schedule(&self) -> Schedule {
        Schedule::WeeklyAt(weekday::FRIDAY, 17)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        process_digest(ctx, Frequency::Weekly)
    }
}
