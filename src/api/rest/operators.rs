use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::presence::{self, PresenceOutcome};
use crate::error::AppError;
use crate::models::job::{EarningsEntry, PenaltyRecord};
use crate::models::operator::{GeoPoint, OperatorProfile, ServiceType, Tier};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/operators", post(create_operator).get(list_operators))
        .route("/operators/:id", get(get_operator))
        .route("/operators/:id/presence", patch(set_presence))
        .route("/operators/:id/location", patch(update_location))
        .route("/operators/:id/earnings", get(list_earnings))
        .route("/operators/:id/penalties", get(list_penalties))
}

#[derive(Deserialize)]
pub struct CreateOperatorRequest {
    pub name: String,
    pub home: GeoPoint,
    pub tiers: Vec<Tier>,
    pub services: Vec<ServiceType>,
    pub rating: f64,
    #[serde(default)]
    pub certified: bool,
    #[serde(default)]
    pub radius_overrides: HashMap<Tier, Option<f64>>,
}

#[derive(Deserialize)]
pub struct PresenceRequest {
    pub online: bool,
    pub tier: Option<Tier>,
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

async fn create_operator(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOperatorRequest>,
) -> Result<Json<OperatorProfile>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    if payload.tiers.is_empty() {
        return Err(AppError::Validation(
            "operator must subscribe to at least one tier".to_string(),
        ));
    }

    if payload.services.is_empty() {
        return Err(AppError::Validation(
            "operator must offer at least one service".to_string(),
        ));
    }

    let operator = OperatorProfile {
        id: Uuid::new_v4(),
        name: payload.name,
        home: payload.home,
        last_position: None,
        subscribed_tiers: payload.tiers,
        active_tier: None,
        view_tier: None,
        radius_overrides: payload.radius_overrides,
        services: payload.services,
        rating: payload.rating.clamp(0.0, 5.0),
        certified: payload.certified,
        active_job: None,
        updated_at: Utc::now(),
    };

    state.operators.insert(operator.id, operator.clone());
    Ok(Json(operator))
}

async fn list_operators(State(state): State<Arc<AppState>>) -> Json<Vec<OperatorProfile>> {
    let operators = state
        .operators
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(operators)
}

async fn get_operator(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OperatorProfile>, AppError> {
    let operator = state
        .operators
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("operator {id} not found")))?;

    Ok(Json(operator.value().clone()))
}

async fn set_presence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PresenceRequest>,
) -> Result<Json<PresenceOutcome>, AppError> {
    if payload.online {
        let tier = payload.tier.ok_or_else(|| {
            AppError::Validation("tier is required to go online".to_string())
        })?;
        let outcome = presence::go_online(&state, id, tier, payload.confirmed)?;
        Ok(Json(outcome))
    } else {
        let presence = presence::go_offline(&state, id)?;
        Ok(Json(PresenceOutcome::Updated(presence)))
    }
}

/// Persists the last-known position. Matching still measures from home.
async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<OperatorProfile>, AppError> {
    let mut operator = state
        .operators
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("operator {id} not found")))?;

    operator.last_position = Some(payload.location);
    operator.updated_at = Utc::now();

    Ok(Json(operator.clone()))
}

async fn list_earnings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EarningsEntry>>, AppError> {
    if !state.operators.contains_key(&id) {
        return Err(AppError::NotFound(format!("operator {id} not found")));
    }

    let mut entries: Vec<EarningsEntry> = state
        .earnings
        .iter()
        .filter(|entry| entry.value().operator_id == id)
        .map(|entry| entry.value().clone())
        .collect();
    entries.sort_by(|a, b| a.period.cmp(&b.period));

    Ok(Json(entries))
}

async fn list_penalties(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PenaltyRecord>>, AppError> {
    if !state.operators.contains_key(&id) {
        return Err(AppError::NotFound(format!("operator {id} not found")));
    }

    let mut records: Vec<PenaltyRecord> = state
        .penalties
        .iter()
        .filter(|entry| entry.value().operator_id == id)
        .map(|entry| entry.value().clone())
        .collect();
    records.sort_by_key(|record| record.recorded_at);

    Ok(Json(records))
}
