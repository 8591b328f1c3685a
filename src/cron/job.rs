use super::context::CronContext;
use super::schedule::Schedule;
use thiserror::Error;

/// Errors surfaced by job execution.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found")]
    NotFound,
    #[error("{0}")]
    Failed(String),
}

impl JobError {
    pub fn failed(msg: impl Into<String>) -> Self {
        JobError::Failed(msg.into())
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        JobError::Failed(format!("{:#}", err))
    }
}

/// A named, independently scheduled unit of background work.
///
/// Jobs execute synchronously inside one dispatcher invocation. Each job is
/// self-contained: it must not rely on another job's side effects being
/// visible within the same tick, and it must leave the durable queues in a
/// consistent state after every single-item transition so that a killed
/// invocation can resume on the next tick.
pub trait CronJob: Send + Sync {
    /// Stable identifier, used in run records and trigger URLs.
    fn id(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// What this job does, for the jobs listing.
    fn description(&self) -> &'static str;

    /// When this job is due.
    fn schedule(&self) -> Schedule;

    /// Execute the job. Progress lines go to the shared trace via
    /// [`CronContext::say`]; the returned error flips the run to `error`.
    fn execute(&self, ctx: &CronContext) -> Result<(), JobError>;
}
