//! Batch geocoding of users and listings without coordinates.

use crate::cron::context::CronContext;
use crate::cron::drain::{drain, DrainConfig, DrainSource};
use crate::cron::job::{CronJob, JobError};
use crate::cron::schedule::Schedule;
use crate::cron::tenants::for_each_tenant;
use crate::queue_store::{GeocodeItem, QueueStore};
use crate::services::{CommunityServices, Geocoder};
use anyhow::Result;

struct GeocodeDrain<'a> {
    queue: &'a dyn QueueStore,
    tenant_id: i64,
}

impl DrainSource for GeocodeDrain<'_> {
    type Item = GeocodeItem;

    fn claim_batch(&self, limit: usize) -> Result<Vec<GeocodeItem>> {
        self.queue.claim_geocode_items(self.tenant_id, limit)
    }

    fn mark_sent(&self, item: &GeocodeItem) -> Result<()> {
        self.queue.mark_geocode_item_sent(item.id)
    }

    fn mark_failed(&self, item: &GeocodeItem, error: &str) -> Result<()> {
        self.queue.mark_geocode_item_failed(item.id, error)
    }

    fn pending_remain(&self) -> Result<bool> {
        self.queue.pending_geocode_items_remain(self.tenant_id)
    }
}

/// Resolves queued addresses through the external geocoder and writes the
/// coordinates back to the platform. The drain pause keeps the request rate
/// polite.
pub struct GeocodeBatchJob;

impl CronJob for GeocodeBatchJob {
    fn id(&self) -> &'static str {
        "geocode-batch"
    }

    fn name(&self) -> &'static str {
        "Batch Geocoding"
    }

    fn description(&self) -> &'static str {
        "Geocodes users and listings that are missing coordinates for distance-based features"
    }

    fn schedule(&self) -> Schedule {
        Schedule::EveryMinutes(30)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        let config = DrainConfig::for_geocoding(&ctx.settings);

        for_each_tenant(ctx, |tenant| {
            let source = GeocodeDrain {
                queue: ctx.queue_store.as_ref(),
                tenant_id: tenant.id,
            };
            let report = drain(&source, &config, |item| {
                match ctx.services.geocoder.geocode(&item.address)? {
                    Some(point) => ctx.services.community.store_coordinates(
                        item.tenant_id,
                        &item.entity_kind,
                        item.entity_id,
                        point,
                    ),
                    None => anyhow::bail!("no match for address"),
                }
            })?;
            if !report.is_empty() {
                ctx.say(format!(
                    "  {}: {} geocoded, {} failed",
                    tenant.slug, report.sent, report.failed
                ));
            }
            Ok(())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::schedule::TickTime;
    use crate::cron::testutil::{tenant_store_at, test_context_with, StubCommunity};
    use crate::queue_store::NewGeocodeItem;
    use crate::services::{GeoPoint, Geocoder, Services};
    use std::sync::Arc;

    struct FixedGeocoder {
        /// Addresses containing this marker resolve; everything else misses.
        marker: &'static str,
    }

    impl Geocoder for FixedGeocoder {
        fn geocode(&self, address: &str) -> anyhow::Result<Option<GeoPoint>> {
            if address.contains(self.marker) {
                Ok(Some(GeoPoint {
                    lat: 50.82,
                    lon: -0.13,
                }))
            } else {
                Ok(None)
            }
        }
    }

    fn geocode_item(tenant_id: i64, entity_id: i64, address: &str) -> NewGeocodeItem {
        NewGeocodeItem {
            tenant_id,
            entity_kind: "listing".to_string(),
            entity_id,
            address: address.to_string(),
        }
    }

    #[test]
    fn resolved_addresses_are_stored_and_misses_marked_failed() {
        let community = StubCommunity::new();
        let services = Services {
            geocoder: Arc::new(FixedGeocoder { marker: "Brighton" }),
            community: Arc::clone(&community) as Arc<dyn crate::services::CommunityServices>,
            ..Services::null()
        };
        let (ctx, dir) = test_context_with(TickTime::new(30, 9, 4), false, services);

        let tenants = tenant_store_at(&dir);
        let tenant = tenants.insert_tenant("brighton", "Brighton Timebank").unwrap();
        ctx.queue_store
            .enqueue_geocode(geocode_item(tenant, 1, "12 Harbour Lane, Brighton"))
            .unwrap();
        ctx.queue_store
            .enqueue_geocode(geocode_item(tenant, 2, "nowhere at all"))
            .unwrap();

        GeocodeBatchJob.execute(&ctx).unwrap();

        assert_eq!(community.calls_for("store-coordinates"), vec![tenant]);
        assert!(!ctx.queue_store.pending_geocode_items_remain(tenant).unwrap());
        assert!(ctx.output().contains("1 geocoded, 1 failed"));
    }
}
