//! The tenant iterator.
//!
//! Runs a callback once per active tenant with the tenant passed explicitly
//! as an argument; there is no ambient "current tenant" state to switch or
//! leak between iterations. The tenant list is re-read on every call.

use super::context::CronContext;
use super::job::JobError;
use crate::tenant_store::{Tenant, TenantStore};
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantSummary {
    /// Tenants whose callback was invoked.
    pub visited: usize,
    /// Tenants whose callback returned an error.
    pub failed: usize,
}

/// Invoke `run` for every active tenant.
///
/// A failure for one tenant is caught, traced with the tenant's slug, and
/// does not stop iteration. Failing to enumerate tenants at all is a
/// job-level error.
pub fn for_each_tenant<F>(ctx: &CronContext, mut run: F) -> Result<TenantSummary, JobError>
where
    F: FnMut(&Tenant) -> anyhow::Result<()>,
{
    let tenants = ctx.tenant_store.active_tenants().map_err(JobError::from)?;

    let mut summary = TenantSummary::default();
    for tenant in &tenants {
        summary.visited += 1;
        if let Err(err) = run(tenant) {
            summary.failed += 1;
            ctx.say(format!("  tenant {}: error: {:#}", tenant.slug, err));
            warn!("Tenant {} failed: {:#}", tenant.slug, err);
        }
    }
    Ok(summary)
}
