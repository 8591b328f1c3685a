use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all Hourbank metrics
const PREFIX: &str = "hourbank";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref CRON_TICKS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_cron_ticks_total"),
        "Dispatcher ticks executed"
    ).expect("Failed to create cron_ticks_total metric");

    pub static ref CRON_JOB_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_cron_job_runs_total"), "Job executions by outcome"),
        &["job", "status"]
    ).expect("Failed to create cron_job_runs_total metric");

    pub static ref CRON_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_cron_job_duration_seconds"),
            "Job execution duration in seconds"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]),
        &["job"]
    ).expect("Failed to create cron_job_duration_seconds metric");
}

/// Register all metrics with the Prometheus registry.
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(CRON_TICKS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CRON_JOB_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CRON_JOB_DURATION_SECONDS.clone()));

    tracing::info!("Metrics system initialized");
}

pub fn record_tick() {
    CRON_TICKS_TOTAL.inc();
}

pub fn record_job_execution(job: &str, status: &str, elapsed: Duration) {
    CRON_JOB_RUNS_TOTAL.with_label_values(&[job, status]).inc();
    CRON_JOB_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(elapsed.as_secs_f64());
}

/// Text-format metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    match encoder.encode(&REGISTRY.gather(), &mut buffer) {
        Ok(()) => (StatusCode::OK, buffer).into_response(),
        Err(err) => {
            tracing::error!("Failed to encode metrics: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_execution_metrics_accumulate() {
        init_metrics();
        let before = CRON_JOB_RUNS_TOTAL
            .with_label_values(&["test-job", "success"])
            .get();
        record_job_execution("test-job", "success", Duration::from_millis(25));
        let after = CRON_JOB_RUNS_TOTAL
            .with_label_values(&["test-job", "success"])
            .get();
        assert_eq!(after, before + 1.0);
    }
}
