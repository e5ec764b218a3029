use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    Moving,
    Cleaning,
    Assembly,
    Repair,
    Electrical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Manual,
    Equipped,
    Certified,
}

/// Per-tier business rules, kept in one table instead of scattered conditionals.
pub struct TierRules {
    pub default_radius_km: Option<f64>,
    pub requires_certification: bool,
    pub services: &'static [ServiceType],
}

impl Tier {
    pub fn rules(self) -> TierRules {
        match self {
            Tier::Manual => TierRules {
                default_radius_km: Some(10.0),
                requires_certification: false,
                services: &[ServiceType::Moving, ServiceType::Cleaning],
            },
            Tier::Equipped => TierRules {
                default_radius_km: Some(50.0),
                requires_certification: false,
                services: &[
                    ServiceType::Moving,
                    ServiceType::Cleaning,
                    ServiceType::Assembly,
                    ServiceType::Repair,
                ],
            },
            Tier::Certified => TierRules {
                default_radius_km: None,
                requires_certification: true,
                services: &[
                    ServiceType::Moving,
                    ServiceType::Cleaning,
                    ServiceType::Assembly,
                    ServiceType::Repair,
                    ServiceType::Electrical,
                ],
            },
        }
    }

    pub fn allows(self, service: ServiceType) -> bool {
        self.rules().services.contains(&service)
    }
}

/// Guard for the single in-progress job an operator may hold across all tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveJob {
    pub job_id: Uuid,
    pub tier: Tier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorProfile {
    pub id: Uuid,
    pub name: String,
    /// Matching always measures from here, never from `last_position`.
    pub home: GeoPoint,
    pub last_position: Option<GeoPoint>,
    pub subscribed_tiers: Vec<Tier>,
    /// The single online tier; `None` means offline.
    pub active_tier: Option<Tier>,
    /// Last tier the operator viewed; UI-routing hint only, survives going offline.
    pub view_tier: Option<Tier>,
    /// Explicit `None` means unrestricted; a missing key falls back to the tier default.
    pub radius_overrides: HashMap<Tier, Option<f64>>,
    pub services: Vec<ServiceType>,
    pub rating: f64,
    pub certified: bool,
    pub active_job: Option<ActiveJob>,
    pub updated_at: DateTime<Utc>,
}

impl OperatorProfile {
    pub fn is_online(&self) -> bool {
        self.active_tier.is_some()
    }

    pub fn effective_radius_km(&self, tier: Tier) -> Option<f64> {
        match self.radius_overrides.get(&tier) {
            Some(override_radius) => *override_radius,
            None => tier.rules().default_radius_km,
        }
    }
}
