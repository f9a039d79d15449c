//! API route definitions.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use super::ApiError;
use crate::error::Error;
use crate::run::command::CommandSpec;
use crate::run::{RunId, RunRecord};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/runs", post(start_run).get(list_runs))
        .route("/runs/{run_id}", get(run_status))
        .route("/runs/{run_id}/log", get(run_log))
        .route("/schedules", post(schedule_run).get(list_schedules))
        .route("/schedules/{id}", axum::routing::delete(cancel_schedule))
        .route("/durations/{name}", get(duration_lookup))
}

fn meta() -> Value {
    json!({
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": { "status": "ok", "version": env!("CARGO_PKG_VERSION") },
        "meta": meta()
    }))
}

/// Start an immediate run; responds as soon as the record exists.
async fn start_run(
    State(state): State<AppState>,
    Json(spec): Json<CommandSpec>,
) -> Result<Json<Value>, ApiError> {
    let run_id = state.supervisor.start_run(&spec).await?;
    Ok(Json(json!({
        "data": { "run_id": run_id },
        "meta": meta()
    })))
}

async fn list_runs(State(state): State<AppState>) -> Json<Value> {
    let runs: Vec<Value> = state.registry.list().await.iter().map(summary).collect();
    let total = runs.len();
    Json(json!({
        "data": runs,
        "meta": { "total": total, "timestamp": Utc::now().to_rfc3339() }
    }))
}

fn summary(record: &RunRecord) -> Value {
    json!({
        "run_id": record.run_id,
        "status": record.status,
        "start_time": record.start_time,
        "end_time": record.end_time,
        "results_file": record.results_file,
        "duration_seconds": record.duration_seconds,
    })
}

/// Full status surface for one run: status, output so far, results file,
/// duration, timestamps.
async fn run_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = RunId::from(run_id.clone());
    let record = state
        .registry
        .snapshot(&id)
        .await
        .ok_or(Error::RunNotFound(run_id))?;
    Ok(Json(json!({
        "data": record,
        "meta": meta()
    })))
}

/// Plain-text export of the captured output log.
async fn run_log(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<String, ApiError> {
    let id = RunId::from(run_id.clone());
    let record = state
        .registry
        .snapshot(&id)
        .await
        .ok_or(Error::RunNotFound(run_id))?;
    Ok(record.output.join("\n"))
}

#[derive(Debug, Deserialize)]
struct ScheduleRunRequest {
    #[serde(flatten)]
    spec: CommandSpec,
    fire_at: DateTime<Utc>,
}

async fn schedule_run(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRunRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = state
        .scheduler
        .schedule(request.spec, request.fire_at)
        .await?;
    Ok(Json(json!({
        "data": { "id": id, "fire_at": request.fire_at },
        "meta": meta()
    })))
}

async fn list_schedules(State(state): State<AppState>) -> Json<Value> {
    let schedules = state.scheduler.list().await;
    let total = schedules.len();
    Json(json!({
        "data": schedules,
        "meta": { "total": total, "timestamp": Utc::now().to_rfc3339() }
    }))
}

async fn cancel_schedule(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    state.scheduler.cancel(id).await?;
    Ok(Json(json!({
        "data": { "id": id, "status": crate::scheduler::ScheduleStatus::Canceled },
        "meta": meta()
    })))
}

/// Duration lookup: in-registry runs first (covers this process's recent
/// runs), then the persisted store (covers previous lifetimes).
async fn duration_lookup(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let seconds = match state.registry.duration_for(&name).await {
        Some(seconds) => Some(seconds),
        None => state.durations.get(&name).await,
    };
    let seconds = seconds.ok_or(Error::DurationNotFound(name.clone()))?;
    Ok(Json(json!({
        "data": { "results_file": name, "duration_seconds": seconds },
        "meta": meta()
    })))
}
