//! The bounded-batch drain engine.
//!
//! Fully drains one logical unit of queued work without a single unbounded
//! transaction and without flooding the downstream transport: claim a bounded
//! batch, process each item independently, then pause before the next batch
//! while work remains. Termination is guaranteed even when every item in a
//! batch fails to reach a terminal state.

use crate::config::CronSettings;
use anyhow::Result;
use std::time::Duration;
use tracing::{debug, warn};

/// Batch size and backpressure pause for one drain run. Derived from
/// [`CronSettings`]; call sites never invent their own values.
#[derive(Debug, Clone)]
pub struct DrainConfig {
    pub batch_size: usize,
    pub pause: Duration,
}

impl DrainConfig {
    pub fn from_settings(settings: &CronSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            pause: settings.batch_pause,
        }
    }

    /// The geocode queue uses a smaller batch against the external API.
    pub fn for_geocoding(settings: &CronSettings) -> Self {
        Self {
            batch_size: settings.geocode_batch_size,
            pause: settings.batch_pause,
        }
    }
}

/// Counters for one drain run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    pub batches: usize,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.processed == 0
    }
}

/// One drainable unit of work: a queue filtered down to the rows a single
/// job invocation owns (one tenant's instant notifications, one newsletter's
/// recipients, ...).
pub trait DrainSource {
    type Item;

    /// Atomically claim up to `limit` pending items in creation order.
    fn claim_batch(&self, limit: usize) -> Result<Vec<Self::Item>>;

    /// Transition a processed item to `sent`.
    fn mark_sent(&self, item: &Self::Item) -> Result<()>;

    /// Transition a failed item to `failed` with its error.
    fn mark_failed(&self, item: &Self::Item, error: &str) -> Result<()>;

    /// Whether pending items remain for this unit.
    fn pending_remain(&self) -> Result<bool>;
}

/// Drain `source` until no work remains or no progress can be made.
///
/// Per-item errors from `deliver` mark that item `failed` and the batch
/// continues. A batch in which no item reached a terminal state ends the
/// invocation for this unit; the remaining items are picked up by the next
/// scheduled tick.
pub fn drain<S, F>(source: &S, config: &DrainConfig, mut deliver: F) -> Result<DrainReport>
where
    S: DrainSource,
    F: FnMut(&S::Item) -> Result<()>,
{
    let mut report = DrainReport::default();

    loop {
        let batch = source.claim_batch(config.batch_size)?;
        if batch.is_empty() {
            break;
        }
        report.batches += 1;

        let mut transitioned = 0usize;
        for item in &batch {
            report.processed += 1;
            match deliver(item) {
                Ok(()) => match source.mark_sent(item) {
                    Ok(()) => {
                        report.sent += 1;
                        transitioned += 1;
                    }
                    Err(err) => warn!("Failed to mark item sent: {:#}", err),
                },
                Err(delivery_err) => {
                    match source.mark_failed(item, &format!("{:#}", delivery_err)) {
                        Ok(()) => {
                            report.failed += 1;
                            transitioned += 1;
                        }
                        Err(err) => warn!("Failed to mark item failed: {:#}", err),
                    }
                }
            }
        }

        if transitioned == 0 {
            // Zero progress: marking is broken, so re-querying would claim
            // nothing new and looping forever. Defer to the next tick.
            debug!("Drain made no progress on a non-empty batch, deferring");
            break;
        }

        if !source.pending_remain()? {
            break;
        }
        if !config.pause.is_zero() {
            std::thread::sleep(config.pause);
        }
    }

    Ok(report)
}
