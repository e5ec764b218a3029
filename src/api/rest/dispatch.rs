use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::dispatch;
use crate::error::AppError;
use crate::models::dispatch::DispatchQueueEntry;
use crate::models::job::AcceptedJob;
use crate::models::operator::{GeoPoint, ServiceType};
use crate::models::request::{RequestStatus, ServiceRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/emergencies", post(create_emergency))
        .route("/emergencies/:id/queue", get(get_queue))
        .route("/emergencies/:id/accept", post(accept_dispatch))
        .route("/emergencies/:id/decline", post(decline_dispatch))
}

#[derive(Deserialize)]
pub struct CreateEmergencyRequest {
    pub requester_id: Uuid,
    pub service: ServiceType,
    pub location: GeoPoint,
    #[serde(default)]
    pub description: String,
    pub budget: Option<String>,
}

#[derive(Deserialize)]
pub struct DispatchActionRequest {
    pub operator_id: Uuid,
}

#[derive(Serialize)]
pub struct EmergencyResponse {
    pub emergency_id: Uuid,
    pub status: RequestStatus,
    pub queue: Vec<DispatchQueueEntry>,
}

async fn create_emergency(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateEmergencyRequest>,
) -> Result<Json<EmergencyResponse>, AppError> {
    let now = Utc::now();
    let request = ServiceRequest {
        id: Uuid::new_v4(),
        requester_id: payload.requester_id,
        service: payload.service,
        location: Some(payload.location),
        emergency: true,
        description: payload.description,
        budget: payload.budget,
        status: RequestStatus::Open,
        quote_window_expires_at: now + state.settings.quote_window,
        quote_count: 0,
        assigned_operator: None,
        created_at: now,
    };

    state.requests.insert(request.id, request.clone());
    state.metrics.requests_open.inc();

    let queue = dispatch::create_queue(&state, request.id)?;
    let status = state
        .requests
        .get(&request.id)
        .map(|r| r.status)
        .unwrap_or(RequestStatus::Open);

    Ok(Json(EmergencyResponse {
        emergency_id: request.id,
        status,
        queue: queue.entries,
    }))
}

async fn get_queue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DispatchQueueEntry>>, AppError> {
    let queue = state
        .dispatch_queues
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("no dispatch queue for request {id}")))?;

    Ok(Json(queue.entries.clone()))
}

async fn accept_dispatch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DispatchActionRequest>,
) -> Result<Json<AcceptedJob>, AppError> {
    let job = dispatch::accept(&state, id, payload.operator_id)?;
    Ok(Json(job))
}

async fn decline_dispatch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DispatchActionRequest>,
) -> Result<Json<Vec<DispatchQueueEntry>>, AppError> {
    let queue = dispatch::decline(&state, id, payload.operator_id)?;
    Ok(Json(queue.entries))
}
