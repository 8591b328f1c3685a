use chrono::{DateTime, Utc};

/// Lifecycle of a persisted job run. Rows are created as `Running` and
/// finalized exactly once as `Success` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

/// One persisted job execution record.
#[derive(Debug, Clone)]
pub struct JobRun {
    pub id: i64,
    pub job_id: String,
    pub status: RunStatus,
    pub output: String,
    pub duration_seconds: Option<f64>,
    pub executed_at: DateTime<Utc>,
    /// Set when the run was triggered on someone's behalf (e.g. the admin
    /// "run now" API); `None` for timer-driven runs.
    pub executed_by: Option<String>,
    pub tenant_id: Option<i64>,
}

/// Aggregated per-job statistics for the operational dashboard.
#[derive(Debug, Clone)]
pub struct JobRunStats {
    pub job_id: String,
    pub last_run: Option<DateTime<Utc>>,
    pub last_status: Option<RunStatus>,
    pub success_count: i64,
    pub error_count: i64,
    pub total_runs: i64,
    pub avg_duration_seconds: f64,
}

/// Result of attempting to take the advisory dispatcher lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquire {
    Acquired,
    Held {
        holder: String,
        since: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_roundtrip() {
        for status in [RunStatus::Running, RunStatus::Success, RunStatus::Error] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("bogus"), None);
    }
}
