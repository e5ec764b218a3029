use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::penalty;
use crate::error::AppError;
use crate::models::job::{AcceptedJob, Cancellation, EarningsEntry, JobStatus, PenaltyRecord};
use crate::models::operator::{ActiveJob, Tier};
use crate::state::AppState;

/// Creates the durable job record when a request is assigned, either by quote
/// acceptance or by dispatch.
pub fn create_accepted(
    state: &AppState,
    request_id: Uuid,
    operator_id: Uuid,
    tier: Tier,
    now: DateTime<Utc>,
) -> AcceptedJob {
    let job = AcceptedJob {
        id: Uuid::new_v4(),
        request_id,
        operator_id,
        tier,
        status: JobStatus::Accepted,
        progress: 0,
        accepted_at: now,
        started_at: None,
        completed_at: None,
        earnings: None,
        cancellation: None,
    };

    state.jobs.insert(job.id, job.clone());
    job
}

/// Moves an accepted job into progress. The operator aggregate carries the
/// single in-progress guard, so a second start anywhere conflicts with
/// `active_jobs` no matter which tier the jobs belong to.
pub fn start(state: &AppState, job_id: Uuid, operator_id: Uuid) -> Result<AcceptedJob, AppError> {
    let now = Utc::now();
    let mut job = owned_job(state, job_id, operator_id)?;

    match job.status {
        JobStatus::Accepted => {}
        JobStatus::InProgress => {
            return Err(AppError::conflict("job_started", "job is already in progress"));
        }
        other => {
            return Err(AppError::conflict(
                "job_terminal",
                format!("job is already {other:?}"),
            ));
        }
    }

    {
        let mut operator = state
            .operators
            .get_mut(&operator_id)
            .ok_or_else(|| AppError::NotFound(format!("operator {operator_id} not found")))?;

        if operator.active_job.is_some() {
            return Err(AppError::conflict(
                "active_jobs",
                "operator already has a job in progress",
            ));
        }

        operator.active_job = Some(ActiveJob {
            job_id,
            tier: job.tier,
        });
        operator.updated_at = now;
    }

    job.status = JobStatus::InProgress;
    job.started_at = Some(now);
    job.progress = 0;

    info!(job_id = %job_id, operator_id = %operator_id, "job started");
    Ok(job.clone())
}

pub fn update_progress(
    state: &AppState,
    job_id: Uuid,
    operator_id: Uuid,
    percent: i64,
) -> Result<AcceptedJob, AppError> {
    let mut job = owned_job(state, job_id, operator_id)?;

    if job.status != JobStatus::InProgress {
        return Err(AppError::conflict(
            "job_not_in_progress",
            format!("job is {:?}", job.status),
        ));
    }

    job.progress = percent.clamp(0, 100) as u8;
    Ok(job.clone())
}

/// Completes an in-progress job and posts the earnings to the daily and
/// monthly ledgers for the job's operator and tier.
pub fn complete(
    state: &AppState,
    job_id: Uuid,
    operator_id: Uuid,
    earnings: f64,
) -> Result<AcceptedJob, AppError> {
    if !earnings.is_finite() || earnings < 0.0 {
        return Err(AppError::Validation(
            "earnings must be a non-negative amount".to_string(),
        ));
    }

    let now = Utc::now();
    let mut job = owned_job(state, job_id, operator_id)?;

    if job.status != JobStatus::InProgress {
        return Err(AppError::conflict(
            "job_not_in_progress",
            format!("job is {:?}", job.status),
        ));
    }

    job.status = JobStatus::Completed;
    job.completed_at = Some(now);
    job.earnings = Some(earnings);
    job.progress = 100;

    release_guard(state, operator_id, job_id, now);
    post_earnings(state, operator_id, job.tier, earnings, now);

    info!(job_id = %job_id, operator_id = %operator_id, earnings, "job completed");
    Ok(job.clone())
}

/// Cancels a job from any non-terminal state. An operator cancelling below
/// 50% progress is penalized with the request's estimated value; a budget that
/// cannot be valued never blocks the cancellation itself.
pub fn cancel(
    state: &AppState,
    job_id: Uuid,
    operator_id: Uuid,
    reason: String,
    by_operator: bool,
) -> Result<AcceptedJob, AppError> {
    let now = Utc::now();
    let mut job = owned_job(state, job_id, operator_id)?;

    if job.status.is_terminal() {
        return Err(AppError::conflict(
            "job_terminal",
            format!("job is already {:?}", job.status),
        ));
    }

    let was_in_progress = job.status == JobStatus::InProgress;

    let mut penalty_amount = None;
    if by_operator {
        let budget = state
            .requests
            .get(&job.request_id)
            .and_then(|request| request.budget.clone());

        match budget.as_deref().and_then(penalty::budget_midpoint) {
            Some(estimate) => {
                if let Some(amount) = penalty::penalty_for(job.progress, estimate) {
                    let record = PenaltyRecord {
                        id: Uuid::new_v4(),
                        operator_id,
                        tier: job.tier,
                        job_id,
                        amount,
                        reason: reason.clone(),
                        recorded_at: now,
                    };
                    state.penalties.insert(record.id, record);
                    state.metrics.penalties_total.inc();
                    penalty_amount = Some(amount);
                    info!(job_id = %job_id, operator_id = %operator_id, amount, "cancellation penalty posted");
                }
            }
            None => {
                if job.progress < 50 {
                    // soft failure: the cancellation still goes through
                    warn!(job_id = %job_id, "could not estimate job value; penalty skipped");
                }
            }
        }
    }

    job.status = JobStatus::Cancelled;
    job.cancellation = Some(Cancellation {
        reason,
        by_operator,
        cancelled_at: now,
        penalty: penalty_amount,
    });

    if was_in_progress {
        release_guard(state, operator_id, job_id, now);
    }

    info!(job_id = %job_id, operator_id = %operator_id, by_operator, "job cancelled");
    Ok(job.clone())
}

fn owned_job<'a>(
    state: &'a AppState,
    job_id: Uuid,
    operator_id: Uuid,
) -> Result<dashmap::mapref::one::RefMut<'a, Uuid, AcceptedJob>, AppError> {
    let job = state
        .jobs
        .get_mut(&job_id)
        .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

    if job.operator_id != operator_id {
        return Err(AppError::Authorization(
            "job belongs to another operator".to_string(),
        ));
    }

    Ok(job)
}

fn release_guard(state: &AppState, operator_id: Uuid, job_id: Uuid, now: DateTime<Utc>) {
    if let Some(mut operator) = state.operators.get_mut(&operator_id) {
        if operator.active_job.map(|guard| guard.job_id) == Some(job_id) {
            operator.active_job = None;
            operator.updated_at = now;
        }
    }
}

fn post_earnings(state: &AppState, operator_id: Uuid, tier: Tier, amount: f64, now: DateTime<Utc>) {
    let daily = now.format("%Y-%m-%d").to_string();
    let monthly = now.format("%Y-%m").to_string();

    for period in [daily, monthly] {
        let key = ledger_key(operator_id, tier, &period);
        state
            .earnings
            .entry(key)
            .and_modify(|entry| {
                entry.total += amount;
                entry.jobs += 1;
            })
            .or_insert_with(|| EarningsEntry {
                operator_id,
                tier,
                period,
                total: amount,
                jobs: 1,
            });
    }
}

fn ledger_key(operator_id: Uuid, tier: Tier, period: &str) -> String {
    format!("{operator_id}|{tier:?}|{period}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{cancel, complete, create_accepted, start, update_progress};
    use crate::models::job::JobStatus;
    use crate::models::operator::{GeoPoint, OperatorProfile, ServiceType, Tier};
    use crate::models::request::{RequestStatus, ServiceRequest};
    use crate::state::{AppState, Settings};

    fn seed_operator(state: &AppState) -> Uuid {
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
                subscribed_tiers: vec![Tier::Manual, Tier::Equipped],
                active_tier: Some(Tier::Manual),
                view_tier: Some(Tier::Manual),
                radius_overrides: HashMap::new(),
                services: vec![ServiceType::Moving],
                rating: 4.0,
                certified: false,
                active_job: None,
                updated_at: Utc::now(),
            },
        );
        id
    }

    fn seed_request(state: &AppState, budget: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        state.requests.insert(
            id,
            ServiceRequest {
                id,
                requester_id: Uuid::new_v4(),
                service: ServiceType::Moving,
                location: None,
                emergency: false,
                description: String::new(),
                budget: budget.map(str::to_string),
                status: RequestStatus::Accepted,
                quote_window_expires_at: Utc::now(),
                quote_count: 0,
                assigned_operator: None,
                created_at: Utc::now(),
            },
        );
        id
    }

    fn setup(budget: Option<&str>) -> (AppState, Uuid, Uuid) {
        let state = AppState::new(Settings::default(), 16);
        let operator_id = seed_operator(&state);
        let request_id = seed_request(&state, budget);
        let job = create_accepted(&state, request_id, operator_id, Tier::Manual, Utc::now());
        (state, operator_id, job.id)
    }

    #[test]
    fn wrong_operator_is_rejected_not_ignored() {
        let (state, _operator_id, job_id) = setup(None);
        let err = start(&state, job_id, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.code(), "forbidden");
        assert_eq!(state.jobs.get(&job_id).unwrap().status, JobStatus::Accepted);
    }

    #[test]
    fn second_in_progress_job_is_blocked_across_tiers() {
        let (state, operator_id, job_id) = setup(None);
        start(&state, job_id, operator_id).unwrap();

        let other_request = seed_request(&state, None);
        let other = create_accepted(&state, other_request, operator_id, Tier::Equipped, Utc::now());

        let err = start(&state, other.id, operator_id).unwrap_err();
        assert_eq!(err.code(), "active_jobs");
        assert_eq!(state.jobs.get(&other.id).unwrap().status, JobStatus::Accepted);
    }

    #[test]
    fn progress_is_clamped() {
        let (state, operator_id, job_id) = setup(None);
        start(&state, job_id, operator_id).unwrap();

        let job = update_progress(&state, job_id, operator_id, 250).unwrap();
        assert_eq!(job.progress, 100);
        let job = update_progress(&state, job_id, operator_id, -5).unwrap();
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn complete_posts_daily_and_monthly_ledger_and_frees_operator() {
        let (state, operator_id, job_id) = setup(None);
        start(&state, job_id, operator_id).unwrap();

        let job = complete(&state, job_id, operator_id, 120.0).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.earnings, Some(120.0));

        let entries: Vec<_> = state
            .earnings
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.total == 120.0 && e.jobs == 1));

        assert!(state.operators.get(&operator_id).unwrap().active_job.is_none());

        // a second job can start now
        let other_request = seed_request(&state, None);
        let other = create_accepted(&state, other_request, operator_id, Tier::Manual, Utc::now());
        start(&state, other.id, operator_id).unwrap();
    }

    #[test]
    fn early_operator_cancellation_posts_midpoint_penalty() {
        let (state, operator_id, job_id) = setup(Some("$40-$60"));
        start(&state, job_id, operator_id).unwrap();
        update_progress(&state, job_id, operator_id, 30).unwrap();

        let job = cancel(&state, job_id, operator_id, "ran late".to_string(), true).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.cancellation.as_ref().unwrap().penalty, Some(50.0));

        let penalties: Vec<_> = state
            .penalties
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        assert_eq!(penalties.len(), 1);
        assert_eq!(penalties[0].amount, 50.0);
        assert!(state.operators.get(&operator_id).unwrap().active_job.is_none());
    }

    #[test]
    fn late_operator_cancellation_has_no_penalty() {
        let (state, operator_id, job_id) = setup(Some("$40-$60"));
        start(&state, job_id, operator_id).unwrap();
        update_progress(&state, job_id, operator_id, 70).unwrap();

        let job = cancel(&state, job_id, operator_id, "requester asked".to_string(), true).unwrap();
        assert_eq!(job.cancellation.as_ref().unwrap().penalty, None);
        assert!(state.penalties.is_empty());
    }

    #[test]
    fn malformed_budget_never_blocks_cancellation() {
        let (state, operator_id, job_id) = setup(Some("whatever it takes"));
        start(&state, job_id, operator_id).unwrap();

        let job = cancel(&state, job_id, operator_id, "oops".to_string(), true).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.cancellation.as_ref().unwrap().penalty, None);
        assert!(state.penalties.is_empty());
    }

    #[test]
    fn terminal_job_cannot_be_mutated() {
        let (state, operator_id, job_id) = setup(None);
        start(&state, job_id, operator_id).unwrap();
        complete(&state, job_id, operator_id, 80.0).unwrap();

        assert_eq!(
            cancel(&state, job_id, operator_id, "too late".to_string(), true)
                .unwrap_err()
                .code(),
            "job_terminal"
        );
        assert!(update_progress(&state, job_id, operator_id, 10).is_err());
    }

    #[test]
    fn cancel_from_accepted_state_by_operator_still_penalizes() {
        let (state, operator_id, job_id) = setup(Some("$100"));
        let job = cancel(&state, job_id, operator_id, "changed mind".to_string(), true).unwrap();
        assert_eq!(job.cancellation.as_ref().unwrap().penalty, Some(100.0));
    }
}
