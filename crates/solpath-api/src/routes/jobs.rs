//! Render-job endpoints.
//!
//! Submission is fire-and-forget: the job id comes back immediately and a
//! worker picks the render up from the queue. Clients poll the status
//! endpoint until the record turns terminal.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use solpath_core::{JobId, JobRecord};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(submit_job).delete(clear_jobs))
        .route("/{id}", get(get_job))
}

#[derive(Debug, Deserialize)]
struct SubmitJobRequest {
    lower: i64,
    upper: i64,
}

async fn submit_job(
    State(state): State<AppState>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<JobRecord>), ApiError> {
    let record = state.jobs.submit(req.lower, req.upper).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    limit: Option<i64>,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<JobRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let jobs = state.jobs.list(limit).await?;
    Ok(Json(jobs))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobRecord>, ApiError> {
    let record = state.jobs.status(JobId::from_uuid(id)).await?;
    Ok(Json(record))
}

/// Administrative bulk clear of all job records and queued deliveries.
async fn clear_jobs(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let deleted = state.jobs.clear().await?;
    Ok(Json(json!({ "deleted": deleted })))
}
