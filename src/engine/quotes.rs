use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::engine::jobs;
use crate::error::AppError;
use crate::models::job::AcceptedJob;
use crate::models::request::{Negotiation, NegotiationStatus, Quote, QuoteStatus, RequestStatus};
use crate::state::AppState;

/// Submits a pending quote for an open, non-emergency request. The quote
/// window is evaluated lazily here: a touch past the window expires the
/// negotiation before the call is judged.
pub fn submit_quote(
    state: &AppState,
    request_id: Uuid,
    operator_id: Uuid,
    price: f64,
    eta_minutes: i64,
) -> Result<Quote, AppError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(AppError::Validation("price must be positive".to_string()));
    }
    if eta_minutes <= 0 {
        return Err(AppError::Validation("eta must be positive".to_string()));
    }

    let now = Utc::now();
    let mut negotiation = state
        .negotiations
        .get_mut(&request_id)
        .ok_or_else(|| AppError::NotFound(format!("no negotiation for request {request_id}")))?;

    touch_window(state, &mut negotiation, now);
    ensure_open(&negotiation)?;

    let tier = {
        let operator = state
            .operators
            .get(&operator_id)
            .ok_or_else(|| AppError::NotFound(format!("operator {operator_id} not found")))?;
        operator.active_tier.ok_or_else(|| {
            AppError::conflict("operator_offline", "operator must be online to quote")
        })?
    };

    {
        let mut request = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;
        if request.status != RequestStatus::Open {
            return Err(AppError::conflict(
                "request_closed",
                format!("request is {:?}", request.status),
            ));
        }
        request.quote_count += 1;
    }

    let quote = Quote {
        id: Uuid::new_v4(),
        request_id,
        operator_id,
        tier,
        price,
        eta_minutes,
        status: QuoteStatus::Pending,
        submitted_at: now,
        expires_at: negotiation.window_expires_at,
    };
    negotiation.quotes.push(quote.clone());

    state
        .metrics
        .quote_outcomes_total
        .with_label_values(&["submitted"])
        .inc();
    info!(request_id = %request_id, operator_id = %operator_id, price, "quote submitted");

    Ok(quote)
}

/// Accepts one quote: siblings still pending are auto-declined, the request is
/// accepted with the quoting operator assigned, and the job record is created.
/// All of it happens under the negotiation's entry lock.
pub fn accept_quote(
    state: &AppState,
    request_id: Uuid,
    quote_id: Uuid,
) -> Result<AcceptedJob, AppError> {
    let now = Utc::now();
    let mut negotiation = state
        .negotiations
        .get_mut(&request_id)
        .ok_or_else(|| AppError::NotFound(format!("no negotiation for request {request_id}")))?;

    touch_window(state, &mut negotiation, now);
    ensure_open(&negotiation)?;

    let idx = negotiation
        .quotes
        .iter()
        .position(|quote| quote.id == quote_id)
        .ok_or_else(|| AppError::NotFound(format!("quote {quote_id} not found")))?;

    if negotiation.quotes[idx].status != QuoteStatus::Pending {
        return Err(AppError::conflict(
            "quote_resolved",
            format!("quote is already {:?}", negotiation.quotes[idx].status),
        ));
    }

    if now >= negotiation.quotes[idx].expires_at {
        negotiation.quotes[idx].status = QuoteStatus::Expired;
        state
            .metrics
            .quote_outcomes_total
            .with_label_values(&["expired"])
            .inc();
        return Err(AppError::Expired("quote has expired".to_string()));
    }

    {
        let request = state
            .requests
            .get(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;
        if request.status != RequestStatus::Open {
            return Err(AppError::conflict(
                "request_closed",
                format!("request is {:?}", request.status),
            ));
        }
    }

    let (operator_id, tier) = {
        let quote = &negotiation.quotes[idx];
        (quote.operator_id, quote.tier)
    };

    negotiation.quotes[idx].status = QuoteStatus::Accepted;
    for (i, quote) in negotiation.quotes.iter_mut().enumerate() {
        if i != idx && quote.status == QuoteStatus::Pending {
            quote.status = QuoteStatus::Declined;
        }
    }
    negotiation.status = NegotiationStatus::Resolved;

    if let Some(mut request) = state.requests.get_mut(&request_id) {
        request.status = RequestStatus::Accepted;
        request.assigned_operator = Some(operator_id);
        state.metrics.requests_open.dec();
    }

    let job = jobs::create_accepted(state, request_id, operator_id, tier, now);

    state
        .metrics
        .quote_outcomes_total
        .with_label_values(&["accepted"])
        .inc();
    info!(request_id = %request_id, quote_id = %quote_id, operator_id = %operator_id, "quote accepted");

    Ok(job)
}

pub fn decline_quote(
    state: &AppState,
    request_id: Uuid,
    quote_id: Uuid,
) -> Result<Quote, AppError> {
    let now = Utc::now();
    let mut negotiation = state
        .negotiations
        .get_mut(&request_id)
        .ok_or_else(|| AppError::NotFound(format!("no negotiation for request {request_id}")))?;

    touch_window(state, &mut negotiation, now);

    let quote = negotiation
        .quotes
        .iter_mut()
        .find(|quote| quote.id == quote_id)
        .ok_or_else(|| AppError::NotFound(format!("quote {quote_id} not found")))?;

    if quote.status != QuoteStatus::Pending {
        return Err(AppError::conflict(
            "quote_resolved",
            format!("quote is already {:?}", quote.status),
        ));
    }

    quote.status = QuoteStatus::Declined;
    let declined = quote.clone();

    state
        .metrics
        .quote_outcomes_total
        .with_label_values(&["declined"])
        .inc();
    info!(request_id = %request_id, quote_id = %quote_id, "quote declined");

    Ok(declined)
}

/// Sweep hook: expires every negotiation whose window has closed. The
/// underlying request deliberately stays open.
pub fn expire_stale(state: &AppState, now: DateTime<Utc>) -> usize {
    let mut closed = 0;

    for mut negotiation in state.negotiations.iter_mut() {
        if negotiation.status == NegotiationStatus::Open && now >= negotiation.window_expires_at {
            expire_negotiation(state, &mut negotiation);
            closed += 1;
        }
    }

    closed
}

fn touch_window(state: &AppState, negotiation: &mut Negotiation, now: DateTime<Utc>) {
    if negotiation.status == NegotiationStatus::Open && now >= negotiation.window_expires_at {
        expire_negotiation(state, negotiation);
    }
}

fn expire_negotiation(state: &AppState, negotiation: &mut Negotiation) {
    negotiation.status = NegotiationStatus::Expired;
    for quote in &mut negotiation.quotes {
        if quote.status == QuoteStatus::Pending {
            quote.status = QuoteStatus::Expired;
            state
                .metrics
                .quote_outcomes_total
                .with_label_values(&["expired"])
                .inc();
        }
    }
    info!(request_id = %negotiation.request_id, "quote window expired");
}

fn ensure_open(negotiation: &Negotiation) -> Result<(), AppError> {
    match negotiation.status {
        NegotiationStatus::Open => Ok(()),
        NegotiationStatus::Resolved => Err(AppError::conflict(
            "negotiation_resolved",
            "a quote has already been accepted",
        )),
        NegotiationStatus::Expired => {
            Err(AppError::Expired("quote window has closed".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{accept_quote, decline_quote, expire_stale, submit_quote};
    use crate::models::job::JobStatus;
    use crate::models::operator::{GeoPoint, OperatorProfile, ServiceType, Tier};
    use crate::models::request::{Negotiation, NegotiationStatus, QuoteStatus, RequestStatus, ServiceRequest};
    use crate::state::{AppState, Settings};

    fn seed_operator(state: &AppState, online: bool) -> Uuid {
        let id = Uuid::new_v4();
        state.operators.insert(
            id,
            OperatorProfile {
                id,
                name: "op".to_string(),
                home: GeoPoint {
                    lat: 43.65,
                    lng: -79.38,
                },
                last_position: None,
                subscribed_tiers: vec![Tier::Equipped],
                active_tier: online.then_some(Tier::Equipped),
                view_tier: Some(Tier::Equipped),
                radius_overrides: HashMap::new(),
                services: vec![ServiceType::Assembly],
                rating: 4.2,
                certified: false,
                active_job: None,
                updated_at: Utc::now(),
            },
        );
        id
    }

    fn seed_request(state: &AppState, window: Duration) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let expires = now + window;
        state.requests.insert(
            id,
            ServiceRequest {
                id,
                requester_id: Uuid::new_v4(),
                service: ServiceType::Assembly,
                location: None,
                emergency: false,
                description: "flat-pack wardrobe".to_string(),
                budget: None,
                status: RequestStatus::Open,
                quote_window_expires_at: expires,
                quote_count: 0,
                assigned_operator: None,
                created_at: now,
            },
        );
        state.negotiations.insert(
            id,
            Negotiation {
                request_id: id,
                status: NegotiationStatus::Open,
                window_expires_at: expires,
                quotes: Vec::new(),
            },
        );
        id
    }

    #[test]
    fn accept_declines_pending_siblings_and_creates_job() {
        let state = AppState::new(Settings::default(), 16);
        let request_id = seed_request(&state, Duration::hours(12));
        let a = seed_operator(&state, true);
        let b = seed_operator(&state, true);
        let c = seed_operator(&state, true);

        let quote_a = submit_quote(&state, request_id, a, 90.0, 60).unwrap();
        submit_quote(&state, request_id, b, 80.0, 45).unwrap();
        submit_quote(&state, request_id, c, 110.0, 30).unwrap();

        let job = accept_quote(&state, request_id, quote_a.id).unwrap();
        assert_eq!(job.status, JobStatus::Accepted);
        assert_eq!(job.operator_id, a);
        assert_eq!(job.tier, Tier::Equipped);

        let negotiation = state.negotiations.get(&request_id).unwrap().clone();
        assert_eq!(negotiation.status, NegotiationStatus::Resolved);
        for quote in &negotiation.quotes {
            if quote.id == quote_a.id {
                assert_eq!(quote.status, QuoteStatus::Accepted);
            } else {
                assert_eq!(quote.status, QuoteStatus::Declined);
            }
        }

        let request = state.requests.get(&request_id).unwrap().clone();
        assert_eq!(request.status, RequestStatus::Accepted);
        assert_eq!(request.assigned_operator, Some(a));
        assert_eq!(request.quote_count, 3);
    }

    #[test]
    fn second_accept_conflicts() {
        let state = AppState::new(Settings::default(), 16);
        let request_id = seed_request(&state, Duration::hours(12));
        let a = seed_operator(&state, true);
        let b = seed_operator(&state, true);

        let quote_a = submit_quote(&state, request_id, a, 90.0, 60).unwrap();
        let quote_b = submit_quote(&state, request_id, b, 85.0, 50).unwrap();

        accept_quote(&state, request_id, quote_a.id).unwrap();
        let err = accept_quote(&state, request_id, quote_b.id).unwrap_err();
        assert_eq!(err.code(), "negotiation_resolved");
    }

    #[test]
    fn offline_operator_cannot_quote() {
        let state = AppState::new(Settings::default(), 16);
        let request_id = seed_request(&state, Duration::hours(12));
        let offline = seed_operator(&state, false);

        let err = submit_quote(&state, request_id, offline, 90.0, 60).unwrap_err();
        assert_eq!(err.code(), "operator_offline");
        assert_eq!(state.requests.get(&request_id).unwrap().quote_count, 0);
    }

    #[test]
    fn submission_past_window_expires_negotiation() {
        let state = AppState::new(Settings::default(), 16);
        let request_id = seed_request(&state, Duration::hours(-1));
        let a = seed_operator(&state, true);

        let err = submit_quote(&state, request_id, a, 90.0, 60).unwrap_err();
        assert_eq!(err.code(), "expired");
        assert_eq!(
            state.negotiations.get(&request_id).unwrap().status,
            NegotiationStatus::Expired
        );
    }

    #[test]
    fn window_expiry_leaves_request_open() {
        let state = AppState::new(Settings::default(), 16);
        let request_id = seed_request(&state, Duration::hours(12));
        let a = seed_operator(&state, true);
        submit_quote(&state, request_id, a, 90.0, 60).unwrap();

        state
            .negotiations
            .get_mut(&request_id)
            .unwrap()
            .window_expires_at = Utc::now() - Duration::minutes(1);

        let closed = expire_stale(&state, Utc::now());
        assert_eq!(closed, 1);

        let negotiation = state.negotiations.get(&request_id).unwrap().clone();
        assert_eq!(negotiation.status, NegotiationStatus::Expired);
        assert_eq!(negotiation.quotes[0].status, QuoteStatus::Expired);

        // the request itself is untouched and can be re-run
        assert_eq!(
            state.requests.get(&request_id).unwrap().status,
            RequestStatus::Open
        );
    }

    #[test]
    fn stale_quote_cannot_be_accepted_while_window_is_open() {
        let state = AppState::new(Settings::default(), 16);
        let request_id = seed_request(&state, Duration::hours(12));
        let a = seed_operator(&state, true);

        let quote = submit_quote(&state, request_id, a, 90.0, 60).unwrap();

        // backdate this quote only; the negotiation window stays open
        state
            .negotiations
            .get_mut(&request_id)
            .unwrap()
            .quotes[0]
            .expires_at = Utc::now() - Duration::minutes(1);

        let err = accept_quote(&state, request_id, quote.id).unwrap_err();
        assert_eq!(err.code(), "expired");

        let negotiation = state.negotiations.get(&request_id).unwrap().clone();
        assert_eq!(negotiation.status, NegotiationStatus::Open);
        assert_eq!(negotiation.quotes[0].status, QuoteStatus::Expired);
        assert_eq!(
            state.requests.get(&request_id).unwrap().status,
            RequestStatus::Open
        );
    }

    #[test]
    fn declined_quote_is_final() {
        let state = AppState::new(Settings::default(), 16);
        let request_id = seed_request(&state, Duration::hours(12));
        let a = seed_operator(&state, true);

        let quote = submit_quote(&state, request_id, a, 90.0, 60).unwrap();
        decline_quote(&state, request_id, quote.id).unwrap();

        let err = accept_quote(&state, request_id, quote.id).unwrap_err();
        assert_eq!(err.code(), "quote_resolved");
    }

    #[test]
    fn non_positive_price_is_rejected() {
        let state = AppState::new(Settings::default(), 16);
        let request_id = seed_request(&state, Duration::hours(12));
        let a = seed_operator(&state, true);

        assert!(submit_quote(&state, request_id, a, 0.0, 60).is_err());
        assert!(submit_quote(&state, request_id, a, -5.0, 60).is_err());
        assert_eq!(state.requests.get(&request_id).unwrap().quote_count, 0);
    }
}
