//! The newsletter pipeline: promote due newsletters into the send queue and
//! drain that queue in bounded batches.

use crate::cron::context::CronContext;
use crate::cron::drain::{drain, DrainConfig, DrainSource};
use crate::cron::job::{CronJob, JobError};
use crate::cron::schedule::Schedule;
use crate::cron::tenants::for_each_tenant;
use crate::queue_store::{Newsletter, NewsletterItem, NewsletterStatus, QueueStore};
use crate::services::{CommunityServices, Mailer};
use anyhow::Result;

/// How many in-flight newsletters one tick will drain per tenant.
const NEWSLETTERS_PER_TICK: usize = 10;

struct NewsletterDrain<'a> {
    queue: &'a dyn QueueStore,
    newsletter_id: &'a str,
}

impl DrainSource for NewsletterDrain<'_> {
    type Item = NewsletterItem;

    fn claim_batch(&self, limit: usize) -> Result<Vec<NewsletterItem>> {
        self.queue.claim_newsletter_items(self.newsletter_id, limit)
    }

    fn mark_sent(&self, item: &NewsletterItem) -> Result<()> {
        self.queue.mark_newsletter_item_sent(item.id)
    }

    fn mark_failed(&self, item: &NewsletterItem, error: &str) -> Result<()> {
        self.queue.mark_newsletter_item_failed(item.id, error)
    }

    fn pending_remain(&self) -> Result<bool> {
        self.queue.pending_newsletter_items_remain(self.newsletter_id)
    }
}

/// Expand a due newsletter into per-recipient queue rows and flip it to
/// `sending`. A newsletter with no recipients is finalized immediately.
fn promote_newsletter(ctx: &CronContext, tenant_slug: &str, newsletter: &Newsletter) -> Result<()> {
    let recipients = ctx
        .services
        .community
        .newsletter_recipients(newsletter.tenant_id, &newsletter.id)?;

    if recipients.is_empty() {
        ctx.queue_store.mark_newsletter_sent(&newsletter.id, ctx.now)?;
        ctx.say(format!(
            "  {}: newsletter {} has no recipients",
            tenant_slug, newsletter.id
        ));
        return Ok(());
    }

    let queued =
        ctx.queue_store
            .enqueue_newsletter_recipients(&newsletter.id, newsletter.tenant_id, &recipients)?;
    ctx.queue_store
        .set_newsletter_status(&newsletter.id, NewsletterStatus::Sending)?;
    ctx.say(format!(
        "  {}: newsletter {} queued for {} recipients",
        tenant_slug, newsletter.id, queued
    ));
    Ok(())
}

/// Drains the newsletter send queue for every tenant.
pub struct NewsletterQueueJob;

impl CronJob for NewsletterQueueJob {
    fn id(&self) -> &'static str {
        "process-newsletter-queue"
    }

    fn name(&self) -> &'static str {
        "Newsletter Queue Processor"
    }

    fn description(&self) -> &'static str {
        "Sends queued newsletter emails in bounded batches and finalizes completed sends"
    }

    fn schedule(&self) -> Schedule {
        Schedule::EveryTick
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        let config = DrainConfig::from_settings(&ctx.settings);

        for_each_tenant(ctx, |tenant| {
            let ids = ctx
                .queue_store
                .sending_newsletter_ids(tenant.id, NEWSLETTERS_PER_TICK)?;
            for id in ids {
                let Some(newsletter) = ctx.queue_store.get_newsletter(&id)? else {
                    continue;
                };
                let source = NewsletterDrain {
                    queue: ctx.queue_store.as_ref(),
                    newsletter_id: &id,
                };
                let report = drain(&source, &config, |item| {
                    ctx.services
                        .mailer
                        .send(&item.recipient, &newsletter.subject, &newsletter.body)
                })?;

                let drained_fully = report.processed == report.sent + report.failed;
                if drained_fully && !ctx.queue_store.pending_newsletter_items_remain(&id)? {
                    ctx.queue_store.mark_newsletter_sent(&id, ctx.now)?;
                    ctx.say(format!(
                        "  {}: newsletter {} finished ({} sent, {} failed)",
                        tenant.slug, id, report.sent, report.failed
                    ));
                } else if !report.is_empty() {
                    ctx.say(format!(
                        "  {}: newsletter {}: {} sent, {} failed this tick",
                        tenant.slug, id, report.sent, report.failed
                    ));
                }
            }
            Ok(())
        })?;
        Ok(())
    }
}

/// Promotes scheduled newsletters whose send time has arrived.
pub struct ScheduledNewslettersJob;

impl CronJob for ScheduledNewslettersJob {
    fn id(&self) -> &'static str {
        "process-newsletters"
    }

    fn name(&self) -> &'static str {
        "Process Scheduled Newsletters"
    }

    fn description(&self) -> &'static str {
        "Checks for newsletters scheduled to be sent and starts their sending process"
    }

    fn schedule(&self) -> Schedule {
        Schedule::EveryMinutes(5)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        let mut promoted = 0usize;
        for_each_tenant(ctx, |tenant| {
            for newsletter in ctx
                .queue_store
                .due_scheduled_newsletters(tenant.id, ctx.now)?
            {
                promote_newsletter(ctx, &tenant.slug, &newsletter)?;
                promoted += 1;
            }
            Ok(())
        })?;
        ctx.say(format!("  {} scheduled newsletters processed", promoted));
        Ok(())
    }
}

/// Re-enqueues recurring newsletters whose interval elapsed.
pub struct RecurringNewslettersJob;

impl CronJob for RecurringNewslettersJob {
    fn id(&self) -> &'static str {
        "process-recurring"
    }

    fn name(&self) -> &'static str {
        "Process Recurring Newsletters"
    }

    fn description(&self) -> &'static str {
        "Restarts recurring newsletters (e.g. weekly community updates) whose interval elapsed"
    }

    fn schedule(&self) -> Schedule {
        Schedule::EveryMinutes(15)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        let mut promoted = 0usize;
        for_each_tenant(ctx, |tenant| {
            for newsletter in ctx
                .queue_store
                .due_recurring_newsletters(tenant.id, ctx.now)?
            {
                promote_newsletter(ctx, &tenant.slug, &newsletter)?;
                promoted += 1;
            }
            Ok(())
        })?;
        ctx.say(format!("  {} recurring newsletters processed", promoted));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::schedule::TickTime;
    use crate::cron::testutil::{
        tenant_store_at, test_context_with, RecordingMailer, StubCommunity,
    };
    use crate::services::{Mailer, NullCommunityServices, Services};
    use chrono::Utc;
    use std::sync::Arc;

    fn scheduled_newsletter(tenant_id: i64, id: &str) -> Newsletter {
        Newsletter {
            id: id.to_string(),
            tenant_id,
            subject: "August community update".to_string(),
            body: "What happened this month".to_string(),
            status: NewsletterStatus::Scheduled,
            scheduled_at: Some(Utc::now() - chrono::Duration::minutes(1)),
            recur_days: None,
            last_sent_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn scheduled_newsletter_is_expanded_and_drained_to_completion() {
        let mailer = RecordingMailer::accepting();
        let recipients: Vec<String> = (0..7).map(|i| format!("r{}@example.org", i)).collect();
        let services = Services {
            mailer: Arc::clone(&mailer) as Arc<dyn Mailer>,
            community: StubCommunity::with_recipients(recipients),
            ..Services::null()
        };
        let (ctx, dir) = test_context_with(TickTime::new(5, 10, 3), false, services);

        let tenants = tenant_store_at(&dir);
        let tenant = tenants.insert_tenant("brighton", "Brighton Timebank").unwrap();
        ctx.queue_store
            .create_newsletter(scheduled_newsletter(tenant, "nl-1"))
            .unwrap();

        ScheduledNewslettersJob.execute(&ctx).unwrap();
        assert_eq!(
            ctx.queue_store.get_newsletter("nl-1").unwrap().unwrap().status,
            NewsletterStatus::Sending
        );

        NewsletterQueueJob.execute(&ctx).unwrap();

        assert_eq!(mailer.sent_count(), 7);
        let finished = ctx.queue_store.get_newsletter("nl-1").unwrap().unwrap();
        assert_eq!(finished.status, NewsletterStatus::Sent);
        assert!(finished.last_sent_at.is_some());
        assert!(ctx.output().contains("finished (7 sent, 0 failed)"));
    }

    #[test]
    fn newsletter_without_recipients_is_finalized_immediately() {
        let services = Services {
            community: Arc::new(NullCommunityServices),
            ..Services::null()
        };
        let (ctx, dir) = test_context_with(TickTime::new(5, 10, 3), false, services);

        let tenants = tenant_store_at(&dir);
        let tenant = tenants.insert_tenant("brighton", "Brighton Timebank").unwrap();
        ctx.queue_store
            .create_newsletter(scheduled_newsletter(tenant, "nl-empty"))
            .unwrap();

        ScheduledNewslettersJob.execute(&ctx).unwrap();

        assert_eq!(
            ctx.queue_store
                .get_newsletter("nl-empty")
                .unwrap()
                .unwrap()
                .status,
            NewsletterStatus::Sent
        );
    }

    #[test]
    fn recurring_newsletter_restarts_after_interval() {
        let mailer = RecordingMailer::accepting();
        let services = Services {
            mailer: Arc::clone(&mailer) as Arc<dyn Mailer>,
            community: StubCommunity::with_recipients(vec!["one@example.org".to_string()]),
            ..Services::null()
        };
        let (ctx, dir) = test_context_with(TickTime::new(15, 10, 3), false, services);

        let tenants = tenant_store_at(&dir);
        let tenant = tenants.insert_tenant("brighton", "Brighton Timebank").unwrap();
        let mut newsletter = scheduled_newsletter(tenant, "nl-weekly");
        newsletter.status = NewsletterStatus::Sent;
        newsletter.scheduled_at = None;
        newsletter.recur_days = Some(7);
        newsletter.last_sent_at = Some(Utc::now() - chrono::Duration::days(8));
        ctx.queue_store.create_newsletter(newsletter).unwrap();

        RecurringNewslettersJob.execute(&ctx).unwrap();

        assert_eq!(
            ctx.queue_store
                .get_newsletter("nl-weekly")
                .unwrap()
                .unwrap()
                .status,
            NewsletterStatus::Sending
        );
        assert!(ctx.output().contains("1 recurring newsletters processed"));
    }
}
