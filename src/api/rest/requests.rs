use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::{quotes, ranking};
use crate::error::AppError;
use crate::models::job::AcceptedJob;
use crate::models::operator::{GeoPoint, OperatorProfile, ServiceType};
use crate::models::request::{Negotiation, NegotiationStatus, Quote, RequestStatus, ServiceRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/quotes", post(submit_quote).get(list_quotes))
        .route("/requests/:id/quotes/:quote_id/accept", post(accept_quote))
        .route("/requests/:id/quotes/:quote_id/decline", post(decline_quote))
        .route("/requests/:id/alternatives", get(list_alternatives))
}

#[derive(Deserialize)]
pub struct CreateRequestRequest {
    pub requester_id: Uuid,
    pub service: ServiceType,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub description: String,
    pub budget: Option<String>,
    #[serde(default)]
    pub emergency: bool,
}

#[derive(Deserialize)]
pub struct SubmitQuoteRequest {
    pub operator_id: Uuid,
    pub price: f64,
    pub eta_minutes: i64,
}

#[derive(Deserialize)]
pub struct AlternativesQuery {
    pub exclude: Option<String>,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRequestRequest>,
) -> Result<Json<ServiceRequest>, AppError> {
    if payload.emergency {
        return Err(AppError::Validation(
            "emergency requests go through /emergencies".to_string(),
        ));
    }

    let now = Utc::now();
    let window_expires_at = now + state.settings.quote_window;

    let request = ServiceRequest {
        id: Uuid::new_v4(),
        requester_id: payload.requester_id,
        service: payload.service,
        location: payload.location,
        emergency: false,
        description: payload.description,
        budget: payload.budget,
        status: RequestStatus::Open,
        quote_window_expires_at: window_expires_at,
        quote_count: 0,
        assigned_operator: None,
        created_at: now,
    };

    state.requests.insert(request.id, request.clone());
    state.negotiations.insert(
        request.id,
        Negotiation {
            request_id: request.id,
            status: NegotiationStatus::Open,
            window_expires_at,
            quotes: Vec::new(),
        },
    );
    state.metrics.requests_open.inc();

    Ok(Json(request))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, AppError> {
    let request = state
        .requests
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;

    Ok(Json(request.value().clone()))
}

async fn submit_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitQuoteRequest>,
) -> Result<Json<Quote>, AppError> {
    let quote = quotes::submit_quote(
        &state,
        id,
        payload.operator_id,
        payload.price,
        payload.eta_minutes,
    )?;
    Ok(Json(quote))
}

async fn list_quotes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Quote>>, AppError> {
    let negotiation = state
        .negotiations
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("no negotiation for request {id}")))?;

    Ok(Json(negotiation.quotes.clone()))
}

async fn accept_quote(
    State(state): State<Arc<AppState>>,
    Path((id, quote_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<AcceptedJob>, AppError> {
    let job = quotes::accept_quote(&state, id, quote_id)?;
    Ok(Json(job))
}

async fn decline_quote(
    State(state): State<Arc<AppState>>,
    Path((id, quote_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Quote>, AppError> {
    let quote = quotes::decline_quote(&state, id, quote_id)?;
    Ok(Json(quote))
}

async fn list_alternatives(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<AlternativesQuery>,
) -> Result<Json<Vec<ranking::RankedOperator>>, AppError> {
    let request = state
        .requests
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?
        .clone();

    let mut excluded: HashSet<Uuid> = HashSet::new();
    if let Some(raw) = query.exclude {
        for part in raw.split(',').filter(|part| !part.is_empty()) {
            let parsed = part
                .trim()
                .parse::<Uuid>()
                .map_err(|_| AppError::Validation(format!("invalid operator id: {part}")))?;
            excluded.insert(parsed);
        }
    }

    let operators: Vec<OperatorProfile> = state
        .operators
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    Ok(Json(ranking::alternatives(&request, operators, &excluded)))
}
