//! Instant notification delivery.

use crate::cron::context::CronContext;
use crate::cron::drain::{drain, DrainConfig, DrainSource};
use crate::cron::job::{CronJob, JobError};
use crate::cron::schedule::Schedule;
use crate::cron::tenants::for_each_tenant;
use crate::queue_store::{Frequency, NotificationItem, QueueStore};
use crate::services::Mailer;
use anyhow::Result;

/// One tenant's slice of the notification queue for one frequency.
pub(crate) struct NotificationDrain<'a> {
    pub queue: &'a dyn QueueStore,
    pub tenant_id: i64,
    pub frequency: Frequency,
}

impl DrainSource for NotificationDrain<'_> {
    type Item = NotificationItem;

    fn claim_batch(&self, limit: usize) -> Result<Vec<NotificationItem>> {
        self.queue
            .claim_notifications(self.tenant_id, self.frequency, limit)
    }

    fn mark_sent(&self, item: &NotificationItem) -> Result<()> {
        self.queue.mark_notification_sent(item.id)
    }

    fn mark_failed(&self, item: &NotificationItem, error: &str) -> Result<()> {
        self.queue.mark_notification_failed(item.id, error)
    }

    fn pending_remain(&self) -> Result<bool> {
        self.queue
            .pending_notifications_remain(self.tenant_id, self.frequency)
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Subject line for an instant notification, derived from the activity type
/// unless the producer supplied one.
pub(crate) fn subject_for(item: &NotificationItem) -> String {
    if let Some(subject) = &item.subject {
        return subject.clone();
    }
    match item.activity_type.as_str() {
        "new_topic" => format!(
            "New discussion: {}",
            snippet(item.body.as_deref().unwrap_or_default(), 50)
        ),
        "new_reply" => "New reply to a discussion you follow".to_string(),
        "hot_match" => "Hot match found".to_string(),
        "mutual_match" => "Mutual match opportunity".to_string(),
        "match_digest" => "Your match digest".to_string(),
        _ => "Notification from Hourbank".to_string(),
    }
}

pub(crate) fn body_for(item: &NotificationItem) -> String {
    let mut body = item.body.clone().unwrap_or_default();
    if let Some(link) = &item.link {
        body.push_str("\n\n");
        body.push_str(link);
    }
    body
}

/// Drains pending instant notifications for every tenant and hands them to
/// the mail relay.
pub struct InstantQueueJob;

impl CronJob for InstantQueueJob {
    fn id(&self) -> &'static str {
        "process-queue"
    }

    fn name(&self) -> &'static str {
        "Instant Notification Queue"
    }

    fn description(&self) -> &'static str {
        "Delivers pending instant notifications through the mail relay"
    }

    fn schedule(&self) -> Schedule {
        Schedule::EveryTick
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        let config = DrainConfig::from_settings(&ctx.settings);
        let mut delivered = 0usize;

        for_each_tenant(ctx, |tenant| {
            let source = NotificationDrain {
                queue: ctx.queue_store.as_ref(),
                tenant_id: tenant.id,
                frequency: Frequency::Instant,
            };
            let report = drain(&source, &config, |item| {
                ctx.services
                    .mailer
                    .send(&item.recipient, &subject_for(item), &body_for(item))
            })?;
            if !report.is_empty() {
                delivered += report.sent;
                ctx.say(format!(
                    "  {}: {} sent, {} failed in {} batches",
                    tenant.slug, report.sent, report.failed, report.batches
                ));
            }
            Ok(())
        })?;

        if delivered == 0 {
            ctx.say("  no pending instant notifications");
        }
        Ok(())
    }
}
