//! Wallet ledger reconciliation.

use super::run_for_tenants;
use crate::cron::context::CronContext;
use crate::cron::job::{CronJob, JobError};
use crate::cron::schedule::{weekday, Schedule};
use crate::services::CommunityServices;

pub struct WalletReconciliationJob;

impl CronJob for WalletReconciliationJob {
    fn id(&self) -> &'static str {
        "wallet-reconciliation"
    }

    fn name(&self) -> &'static str {
        "Wallet Reconciliation"
    }

    fn description(&self) -> &'static str {
        "Audits wallet balances against the transaction ledger and flags discrepancies"
    }

    fn schedule(&self) -> Schedule {
        Schedule::WeeklyAt(weekday::SUNDAY, 3)
    }

    fn execute(&self, ctx: &CronContext) -> Result<(), JobError> {
        run_for_tenants(ctx, "wallets audited", |tenant| {
            ctx.services.community.reconcile_wallets(tenant.id)
        })
    }
}
