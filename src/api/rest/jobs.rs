use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::jobs;
use crate::error::AppError;
use crate::models::job::AcceptedJob;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/start", post(start_job))
        .route("/jobs/:id/progress", patch(update_progress))
        .route("/jobs/:id/complete", post(complete_job))
        .route("/jobs/:id/cancel", post(cancel_job))
}

#[derive(Deserialize)]
pub struct StartJobRequest {
    pub operator_id: Uuid,
}

#[derive(Deserialize)]
pub struct UpdateProgressRequest {
    pub operator_id: Uuid,
    pub percent: i64,
}

#[derive(Deserialize)]
pub struct CompleteJobRequest {
    pub operator_id: Uuid,
    pub earnings: f64,
}

#[derive(Deserialize)]
pub struct CancelJobRequest {
    pub operator_id: Uuid,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub cancelled_by_operator: bool,
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AcceptedJob>, AppError> {
    let job = state
        .jobs
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("job {id} not found")))?;

    Ok(Json(job.value().clone()))
}

async fn start_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StartJobRequest>,
) -> Result<Json<AcceptedJob>, AppError> {
    let job = jobs::start(&state, id, payload.operator_id)?;
    Ok(Json(job))
}

async fn update_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProgressRequest>,
) -> Result<Json<AcceptedJob>, AppError> {
    let job = jobs::update_progress(&state, id, payload.operator_id, payload.percent)?;
    Ok(Json(job))
}

async fn complete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteJobRequest>,
) -> Result<Json<AcceptedJob>, AppError> {
    let job = jobs::complete(&state, id, payload.operator_id, payload.earnings)?;
    Ok(Json(job))
}

async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelJobRequest>,
) -> Result<Json<AcceptedJob>, AppError> {
    let job = jobs::cancel(
        &state,
        id,
        payload.operator_id,
        payload.reason,
        payload.cancelled_by_operator,
    )?;
    Ok(Json(job))
}
