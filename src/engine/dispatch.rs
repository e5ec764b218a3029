use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::jobs;
use crate::error::AppError;
use crate::geo;
use crate::models::dispatch::{DispatchQueue, DispatchQueueEntry, EntryStatus};
use crate::models::event::{DispatchEvent, DispatchEventKind};
use crate::models::job::AcceptedJob;
use crate::models::operator::OperatorProfile;
use crate::models::request::RequestStatus;
use crate::state::AppState;

/// Builds the ordered candidate queue for an emergency request: nearest
/// eligible operators first, capped at the configured fan-out. Entry #1 is
/// notified immediately; the rest wait their turn. An empty candidate set
/// exhausts the queue at birth and cancels the request.
pub fn create_queue(state: &AppState, request_id: Uuid) -> Result<DispatchQueue, AppError> {
    let request = state
        .requests
        .get(&request_id)
        .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?
        .clone();

    if !request.emergency {
        return Err(AppError::Validation(
            "request is not flagged as an emergency".to_string(),
        ));
    }

    if request.status != RequestStatus::Open {
        return Err(AppError::conflict(
            "request_closed",
            format!("request is {:?}", request.status),
        ));
    }

    let now = Utc::now();
    let operators: Vec<OperatorProfile> = state
        .operators
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    let mut candidates = geo::eligible_operators(&request, operators);
    candidates.sort_by(|a, b| {
        a.distance_km
            .unwrap_or(f64::INFINITY)
            .total_cmp(&b.distance_km.unwrap_or(f64::INFINITY))
    });
    candidates.truncate(state.settings.dispatch_fanout);

    let mut queue = DispatchQueue {
        request_id,
        entries: candidates
            .iter()
            .enumerate()
            .map(|(i, candidate)| DispatchQueueEntry {
                operator_id: candidate.operator.id,
                position: (i + 1) as u32,
                status: EntryStatus::Pending,
                notified_at: None,
                expires_at: None,
                distance_km: candidate.distance_km,
            })
            .collect(),
        resolved: false,
        created_at: now,
    };

    if queue.entries.is_empty() {
        queue.resolved = true;
        close_request(state, request_id);
        publish(state, request_id, None, DispatchEventKind::Exhausted, now);
        state
            .metrics
            .dispatch_outcomes_total
            .with_label_values(&["exhausted"])
            .inc();
        warn!(request_id = %request_id, "no eligible operators for emergency; request cancelled");
    } else {
        let ttl = state.settings.dispatch_entry_ttl;
        let first = &mut queue.entries[0];
        first.status = EntryStatus::Notified;
        first.notified_at = Some(now);
        first.expires_at = Some(now + ttl);

        let notified = first.operator_id;
        publish(
            state,
            request_id,
            Some(notified),
            DispatchEventKind::Notified,
            now,
        );
        state
            .metrics
            .dispatch_outcomes_total
            .with_label_values(&["notified"])
            .inc();
        info!(
            request_id = %request_id,
            candidates = queue.entries.len(),
            notified = %notified,
            "dispatch queue created"
        );
    }

    state.dispatch_queues.insert(request_id, queue.clone());
    Ok(queue)
}

/// First accept wins: the caller's entry must currently be notified. Every
/// other entry is declined regardless of prior status, the request is
/// assigned, and the accepted job is created.
pub fn accept(
    state: &AppState,
    request_id: Uuid,
    operator_id: Uuid,
) -> Result<AcceptedJob, AppError> {
    let now = Utc::now();
    let ttl = state.settings.dispatch_entry_ttl;

    let mut queue = state
        .dispatch_queues
        .get_mut(&request_id)
        .ok_or_else(|| AppError::NotFound(format!("no dispatch queue for request {request_id}")))?;

    if queue.resolved {
        return Err(AppError::conflict(
            "dispatch_resolved",
            "emergency is already resolved",
        ));
    }

    expire_and_advance(state, &mut queue, now, ttl);

    let idx = queue
        .entries
        .iter()
        .position(|entry| entry.operator_id == operator_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "operator {operator_id} has no entry for this emergency"
            ))
        })?;

    match queue.entries[idx].status {
        EntryStatus::Notified => {}
        EntryStatus::Expired => {
            return Err(AppError::Expired(
                "dispatch window for this operator has passed".to_string(),
            ));
        }
        EntryStatus::Pending => {
            return Err(AppError::conflict(
                "dispatch_entry_not_notified",
                "operator has not been notified yet",
            ));
        }
        other => {
            return Err(AppError::conflict(
                "dispatch_entry_resolved",
                format!("dispatch entry is already {other:?}"),
            ));
        }
    }

    let tier = {
        let operator = state
            .operators
            .get(&operator_id)
            .ok_or_else(|| AppError::NotFound(format!("operator {operator_id} not found")))?;
        operator.active_tier.ok_or_else(|| {
            AppError::conflict("operator_offline", "operator must be online to accept")
        })?
    };

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

    queue.entries[idx].status = EntryStatus::Accepted;
    for (i, entry) in queue.entries.iter_mut().enumerate() {
        if i != idx {
            entry.status = EntryStatus::Declined;
        }
    }
    queue.resolved = true;

    if let Some(mut request) = state.requests.get_mut(&request_id) {
        request.status = RequestStatus::Assigned;
        request.assigned_operator = Some(operator_id);
        state.metrics.requests_open.dec();
    }

    let job = jobs::create_accepted(state, request_id, operator_id, tier, now);

    publish(
        state,
        request_id,
        Some(operator_id),
        DispatchEventKind::Assigned,
        now,
    );
    state
        .metrics
        .dispatch_outcomes_total
        .with_label_values(&["accepted"])
        .inc();
    info!(request_id = %request_id, operator_id = %operator_id, "emergency assigned");

    Ok(job)
}

/// Declines the caller's notified entry and promotes the next pending one.
pub fn decline(
    state: &AppState,
    request_id: Uuid,
    operator_id: Uuid,
) -> Result<DispatchQueue, AppError> {
    let now = Utc::now();
    let ttl = state.settings.dispatch_entry_ttl;

    let mut queue = state
        .dispatch_queues
        .get_mut(&request_id)
        .ok_or_else(|| AppError::NotFound(format!("no dispatch queue for request {request_id}")))?;

    if queue.resolved {
        return Err(AppError::conflict(
            "dispatch_resolved",
            "emergency is already resolved",
        ));
    }

    expire_and_advance(state, &mut queue, now, ttl);

    let idx = queue
        .entries
        .iter()
        .position(|entry| entry.operator_id == operator_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "operator {operator_id} has no entry for this emergency"
            ))
        })?;

    match queue.entries[idx].status {
        EntryStatus::Notified => {}
        EntryStatus::Expired => {
            return Err(AppError::Expired(
                "dispatch window for this operator has passed".to_string(),
            ));
        }
        EntryStatus::Pending => {
            return Err(AppError::conflict(
                "dispatch_entry_not_notified",
                "operator has not been notified yet",
            ));
        }
        other => {
            return Err(AppError::conflict(
                "dispatch_entry_resolved",
                format!("dispatch entry is already {other:?}"),
            ));
        }
    }

    queue.entries[idx].status = EntryStatus::Declined;
    state
        .metrics
        .dispatch_outcomes_total
        .with_label_values(&["declined"])
        .inc();
    info!(request_id = %request_id, operator_id = %operator_id, "dispatch entry declined");

    advance_queue(state, &mut queue, now, ttl);
    Ok(queue.clone())
}

/// Promote the lowest-position pending entry with a fresh expiry. Pure queue
/// transition; callers hold the queue's entry lock.
pub fn advance(
    entries: &mut [DispatchQueueEntry],
    now: DateTime<Utc>,
    ttl: Duration,
) -> Option<usize> {
    let idx = entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.status == EntryStatus::Pending)
        .min_by_key(|(_, entry)| entry.position)
        .map(|(i, _)| i)?;

    let entry = &mut entries[idx];
    entry.status = EntryStatus::Notified;
    entry.notified_at = Some(now);
    entry.expires_at = Some(now + ttl);
    Some(idx)
}

/// Sweep hook: expires every stale notified entry and advances its queue.
/// Returns the number of entries closed.
pub fn expire_stale(state: &AppState, now: DateTime<Utc>) -> usize {
    let ttl = state.settings.dispatch_entry_ttl;
    let mut closed = 0;

    for mut queue in state.dispatch_queues.iter_mut() {
        if queue.resolved {
            continue;
        }
        if stale_notified(&queue.entries, now).is_some() {
            expire_and_advance(state, &mut queue, now, ttl);
            closed += 1;
        }
    }

    closed
}

fn stale_notified(entries: &[DispatchQueueEntry], now: DateTime<Utc>) -> Option<usize> {
    entries.iter().position(|entry| {
        entry.status == EntryStatus::Notified && entry.expires_at.is_some_and(|at| at <= now)
    })
}

fn expire_and_advance(state: &AppState, queue: &mut DispatchQueue, now: DateTime<Utc>, ttl: Duration) {
    let Some(idx) = stale_notified(&queue.entries, now) else {
        return;
    };

    queue.entries[idx].status = EntryStatus::Expired;
    state
        .metrics
        .dispatch_outcomes_total
        .with_label_values(&["expired"])
        .inc();
    info!(
        request_id = %queue.request_id,
        position = queue.entries[idx].position,
        "dispatch entry expired"
    );

    advance_queue(state, queue, now, ttl);
}

fn advance_queue(state: &AppState, queue: &mut DispatchQueue, now: DateTime<Utc>, ttl: Duration) {
    match advance(&mut queue.entries, now, ttl) {
        Some(idx) => {
            let notified = queue.entries[idx].operator_id;
            publish(
                state,
                queue.request_id,
                Some(notified),
                DispatchEventKind::Notified,
                now,
            );
            state
                .metrics
                .dispatch_outcomes_total
                .with_label_values(&["notified"])
                .inc();
            info!(
                request_id = %queue.request_id,
                operator_id = %notified,
                position = queue.entries[idx].position,
                "next dispatch entry notified"
            );
        }
        None => {
            queue.resolved = true;
            close_request(state, queue.request_id);
            publish(state, queue.request_id, None, DispatchEventKind::Exhausted, now);
            state
                .metrics
                .dispatch_outcomes_total
                .with_label_values(&["exhausted"])
                .inc();
            warn!(request_id = %queue.request_id, "dispatch queue exhausted; request cancelled");
        }
    }
}

fn close_request(state: &AppState, request_id: Uuid) {
    if let Some(mut request) = state.requests.get_mut(&request_id) {
        if request.status == RequestStatus::Open {
            request.status = RequestStatus::Cancelled;
            state.metrics.requests_open.dec();
        }
    }
}

fn publish(
    state: &AppState,
    request_id: Uuid,
    operator_id: Option<Uuid>,
    kind: DispatchEventKind,
    at: DateTime<Utc>,
) {
    let _ = state.dispatch_events_tx.send(DispatchEvent {
        request_id,
        operator_id,
        kind,
        at,
    });
}
