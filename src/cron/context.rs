use super::schedule::TickTime;
use crate::config::CronSettings;
use crate::cron_store::CronStore;
use crate::queue_store::QueueStore;
use crate::services::Services;
use crate::tenant_store::TenantStore;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Everything a job needs for one dispatcher invocation.
///
/// Created once per invocation: the wall clock is read at construction and
/// never again, so all predicate evaluation and due-date comparison inside
/// the tick sees one consistent time.
pub struct CronContext {
    /// Time components of this tick, for the schedule predicates.
    pub tick: TickTime,
    /// Wall-clock instant of this tick, for due-date comparisons.
    pub now: DateTime<Utc>,
    /// True when invoked from an enclosing context (e.g. the admin "run now"
    /// API) that owns its own run logging.
    pub nested: bool,
    pub settings: CronSettings,
    pub cron_store: Arc<dyn CronStore>,
    pub queue_store: Arc<dyn QueueStore>,
    pub tenant_store: Arc<dyn TenantStore>,
    pub services: Services,
    output: Mutex<String>,
}

impl CronContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tick: TickTime,
        now: DateTime<Utc>,
        nested: bool,
        settings: CronSettings,
        cron_store: Arc<dyn CronStore>,
        queue_store: Arc<dyn QueueStore>,
        tenant_store: Arc<dyn TenantStore>,
        services: Services,
    ) -> Self {
        Self {
            tick,
            now,
            nested,
            settings,
            cron_store,
            queue_store,
            tenant_store,
            services,
            output: Mutex::new(String::new()),
        }
    }

    /// Append one line to the shared execution trace.
    pub fn say(&self, line: impl AsRef<str>) {
        let mut output = self.output.lock().unwrap();
        output.push_str(line.as_ref());
        output.push('\n');
    }

    /// The trace accumulated so far.
    pub fn output(&self) -> String {
        self.output.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::cron::schedule::TickTime;
    use crate::cron::testutil::test_context;

    #[test]
    fn say_accumulates_lines_in_order() {
        let (ctx, _dir) = test_context(TickTime::new(0, 0, 0), false);
        ctx.say("first");
        ctx.say("second");
        assert_eq!(ctx.output(), "first\nsecond\n");
    }

    #[test]
    fn output_starts_empty() {
        let (ctx, _dir) = test_context(TickTime::new(30, 11, 3), true);
        assert!(ctx.output().is_empty());
        assert!(ctx.nested);
    }
}
