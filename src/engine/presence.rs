use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::operator::{OperatorProfile, Tier};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PresenceState {
    pub is_online: bool,
    pub active_tier: Option<Tier>,
    pub view_tier: Option<Tier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PresenceOutcome {
    Updated(PresenceState),
    ConfirmationRequired {
        requires_confirmation: bool,
        current_tier: Tier,
        new_tier: Tier,
    },
}

/// Brings an operator online on `tier`. Switching away from another tier is a
/// two-phase commit: the first unconfirmed call returns `ConfirmationRequired`
/// without mutating anything. The whole call holds the operator entry, so the
/// swap can never leave two tiers online.
pub fn go_online(
    state: &AppState,
    operator_id: Uuid,
    tier: Tier,
    confirmed: bool,
) -> Result<PresenceOutcome, AppError> {
    let mut operator = state
        .operators
        .get_mut(&operator_id)
        .ok_or_else(|| AppError::NotFound(format!("operator {operator_id} not found")))?;

    if !operator.subscribed_tiers.contains(&tier) {
        return Err(AppError::Validation(format!(
            "operator is not subscribed to tier {tier:?}"
        )));
    }

    if let Some(current) = operator.active_tier {
        if current != tier {
            if operator.active_job.map(|job| job.tier) == Some(current) {
                return Err(AppError::conflict(
                    "active_jobs",
                    format!("cannot leave tier {current:?} while a job is in progress"),
                ));
            }

            if !confirmed {
                return Ok(PresenceOutcome::ConfirmationRequired {
                    requires_confirmation: true,
                    current_tier: current,
                    new_tier: tier,
                });
            }
        }
    }

    operator.active_tier = Some(tier);
    operator.view_tier = Some(tier);
    operator.updated_at = Utc::now();

    info!(operator_id = %operator_id, tier = ?tier, "operator online");
    Ok(PresenceOutcome::Updated(presence_state(&operator)))
}

/// Clears the online tier; the last-viewed tier survives as a routing hint.
pub fn go_offline(state: &AppState, operator_id: Uuid) -> Result<PresenceState, AppError> {
    let mut operator = state
        .operators
        .get_mut(&operator_id)
        .ok_or_else(|| AppError::NotFound(format!("operator {operator_id} not found")))?;

    operator.active_tier = None;
    operator.updated_at = Utc::now();

    info!(operator_id = %operator_id, "operator offline");
    Ok(presence_state(&operator))
}

fn presence_state(operator: &OperatorProfile) -> PresenceState {
    PresenceState {
        is_online: operator.active_tier.is_some(),
        active_tier: operator.active_tier,
        view_tier: operator.view_tier,
    }
}
