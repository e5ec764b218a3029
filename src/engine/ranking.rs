use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use crate::geo;
use crate::models::operator::OperatorProfile;
use crate::models::request::ServiceRequest;

#[derive(Debug, Clone, Serialize)]
pub struct RankedOperator {
    pub operator_id: Uuid,
    pub name: String,
    pub rating: f64,
    pub distance_km: Option<f64>,
}

/// Re-ranks candidates after a decline: eligibility minus the block-list,
/// best rating first, nearest breaking ties. Candidates without a distance
/// sort after located ones.
pub fn alternatives(
    request: &ServiceRequest,
    operators: impl IntoIterator<Item = OperatorProfile>,
    excluded: &HashSet<Uuid>,
) -> Vec<RankedOperator> {
    let mut ranked: Vec<RankedOperator> = geo::eligible_operators(request, operators)
        .into_iter()
        .filter(|candidate| !excluded.contains(&candidate.operator.id))
        .map(|candidate| RankedOperator {
            operator_id: candidate.operator.id,
            name: candidate.operator.name,
            rating: candidate.operator.rating,
            distance_km: candidate.distance_km,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.rating.total_cmp(&a.rating).then_with(|| {
            a.distance_km
                .unwrap_or(f64::INFINITY)
                .total_cmp(&b.distance_km.unwrap_or(f64::INFINITY))
        })
    });

    ranked
}
