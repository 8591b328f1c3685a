use super::metrics;
use super::state::ServerState;
use crate::bootstrap::Runtime;
use crate::config::AppConfig;
use crate::cron::guard::{authorize, AccessDenied, Trigger};
use crate::cron::run_logger::truncate_output;
use crate::cron::JobError;
use crate::cron_store::{CronStore, RunStatus};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

/// The shared secret arrives as `?key=` or the `X-Cron-Key` header.
fn extract_key(params: &HashMap<String, String>, headers: &HeaderMap) -> Option<String> {
    params.get("key").cloned().or_else(|| {
        headers
            .get("x-cron-key")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    })
}

/// 503 when no key is configured at all, 403 on a bad key.
fn check_access(
    state: &ServerState,
    params: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<(), Response> {
    let trigger = Trigger::Http {
        key: extract_key(params, headers),
    };
    match authorize(state.config.cron_key.as_deref(), &trigger) {
        Ok(()) => Ok(()),
        Err(denied @ AccessDenied::NotConfigured) => {
            Err((StatusCode::SERVICE_UNAVAILABLE, format!("{}\n", denied)).into_response())
        }
        Err(AccessDenied::InvalidKey) => {
            Err((StatusCode::FORBIDDEN, "forbidden\n").into_response())
        }
    }
}

fn plain_text(body: String) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

async fn healthz(State(state): State<ServerState>) -> Response {
    Json(json!({
        "status": "ok",
        "uptime": format_uptime(state.start_time.elapsed()),
        "build": env!("GIT_HASH"),
    }))
    .into_response()
}

/// The master tick endpoint. The external timer hits this once per minute;
/// the response body is the human-readable execution trace.
async fn run_all(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_access(&state, &params, &headers) {
        return response;
    }

    let runtime = Arc::clone(&state.runtime);
    let result = tokio::task::spawn_blocking(move || {
        let ctx = runtime.make_context(false);
        let status = runtime.dispatcher.run_all(&ctx);
        (status, ctx.output())
    })
    .await;

    match result {
        Ok((_status, output)) => plain_text(output),
        Err(err) => {
            error!("Cron invocation task failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Trigger a single job under its own run record.
async fn run_single_job(
    State(state): State<ServerState>,
    Path(job_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_access(&state, &params, &headers) {
        return response;
    }

    let runtime = Arc::clone(&state.runtime);
    let result = tokio::task::spawn_blocking(move || {
        let ctx = runtime.make_context(false);
        runtime
            .dispatcher
            .run_job(&job_id, &ctx)
            .map(|status| (status, ctx.output()))
    })
    .await;

    match result {
        Ok(Ok((_status, output))) => plain_text(output),
        Ok(Err(JobError::NotFound)) => {
            (StatusCode::NOT_FOUND, "unknown job\n").into_response()
        }
        Ok(Err(err)) => {
            error!("Single-job run failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(err) => {
            error!("Cron invocation task failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Admin "run now": this handler owns the run record (with `executed_by`),
/// so the job itself executes with a nested context and logs nothing.
async fn admin_run_job(
    State(state): State<ServerState>,
    Path(job_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_access(&state, &params, &headers) {
        return response;
    }
    if state.runtime.dispatcher.find(&job_id).is_none() {
        return (StatusCode::NOT_FOUND, "unknown job\n").into_response();
    }

    let runtime = Arc::clone(&state.runtime);
    let result = tokio::task::spawn_blocking(move || -> Result<(RunStatus, String)> {
        let run_id = runtime
            .cron_store
            .record_run_start(&job_id, Some("admin-api"), None)?;
        let started = Instant::now();

        let ctx = runtime.make_context(true);
        let status = match runtime.dispatcher.run_job(&job_id, &ctx) {
            Ok(status) => status,
            Err(_) => RunStatus::Error,
        };
        let output = ctx.output();

        runtime.cron_store.record_run_finish(
            run_id,
            status,
            truncate_output(&output),
            started.elapsed().as_secs_f64(),
        )?;
        Ok((status, output))
    })
    .await;

    match result {
        Ok(Ok((status, output))) => Json(json!({
            "status": status.as_str(),
            "output": output,
        }))
        .into_response(),
        Ok(Err(err)) => {
            error!("Admin job run failed: {:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(err) => {
            error!("Admin job task failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Job catalogue with 30-day statistics, for the operations dashboard.
async fn jobs_json(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_access(&state, &params, &headers) {
        return response;
    }

    let since = Utc::now() - chrono::Duration::days(30);
    let stats = match state.runtime.cron_store.job_stats(since) {
        Ok(stats) => stats,
        Err(err) => {
            error!("Failed to load job stats: {:#}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let stats_by_job: HashMap<&str, _> = stats
        .iter()
        .map(|entry| (entry.job_id.as_str(), entry))
        .collect();

    let jobs: Vec<_> = state
        .runtime
        .dispatcher
        .jobs()
        .iter()
        .map(|job| {
            let stats = stats_by_job.get(job.id());
            json!({
                "id": job.id(),
                "name": job.name(),
                "description": job.description(),
                "schedule": job.schedule().describe(),
                "last_run": stats.and_then(|s| s.last_run.map(|t| t.to_rfc3339())),
                "last_status": stats.and_then(|s| s.last_status.map(|st| st.as_str())),
                "total_runs": stats.map(|s| s.total_runs).unwrap_or(0),
                "success_count": stats.map(|s| s.success_count).unwrap_or(0),
                "error_count": stats.map(|s| s.error_count).unwrap_or(0),
                "avg_duration_seconds": stats.map(|s| s.avg_duration_seconds).unwrap_or(0.0),
            })
        })
        .collect();

    Json(json!({ "jobs": jobs })).into_response()
}

/// Recent run log rows, optionally filtered by job id.
async fn logs_json(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_access(&state, &params, &headers) {
        return response;
    }

    let job_id = params.get("job").map(String::as_str);
    let limit = params
        .get("limit")
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(50)
        .min(500);

    match state.runtime.cron_store.recent_runs(job_id, limit) {
        Ok(runs) => {
            let rows: Vec<_> = runs
                .iter()
                .map(|run| {
                    json!({
                        "id": run.id,
                        "job_id": run.job_id,
                        "status": run.status.as_str(),
                        "output": run.output,
                        "duration_seconds": run.duration_seconds,
                        "executed_at": run.executed_at.to_rfc3339(),
                        "executed_by": run.executed_by,
                        "tenant_id": run.tenant_id,
                    })
                })
                .collect();
            Json(json!({ "runs": rows })).into_response()
        }
        Err(err) => {
            error!("Failed to load run log: {:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/cron/run-all", get(run_all))
        .route("/cron/jobs.json", get(jobs_json))
        .route("/cron/logs.json", get(logs_json))
        .route("/cron/run/{job_id}", post(admin_run_job))
        .route("/cron/{job_id}", get(run_single_job))
        .with_state(state)
}

pub async fn run_server(config: AppConfig, runtime: Arc<Runtime>) -> Result<()> {
    let port = config.port;
    let state = ServerState::new(config, runtime);
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("Ready to serve at port {}!", port);
    Ok(axum::serve(listener, app).await?)
}
