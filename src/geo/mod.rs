use crate::models::operator::{GeoPoint, OperatorProfile};
use crate::models::request::ServiceRequest;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub operator: OperatorProfile,
    /// `None` when the request carries no coordinates.
    pub distance_km: Option<f64>,
}

/// Tier-radius eligibility filter. An operator qualifies when it offers the
/// requested service, its online tier permits that service (certification
/// included), and its **home** coordinates lie within the tier's effective
/// radius of the request. A request without coordinates is included rather
/// than excluded, with no distance attached.
pub fn eligible_operators(
    request: &ServiceRequest,
    operators: impl IntoIterator<Item = OperatorProfile>,
) -> Vec<Candidate> {
    operators
        .into_iter()
        .filter_map(|operator| {
            let tier = operator.active_tier?;

            if !operator.services.contains(&request.service) || !tier.allows(request.service) {
                return None;
            }

            if tier.rules().requires_certification && !operator.certified {
                return None;
            }

            let Some(point) = request.location else {
                return Some(Candidate {
                    operator,
                    distance_km: None,
                });
            };

            let distance_km = haversine_km(&operator.home, &point);
            match operator.effective_radius_km(tier) {
                Some(radius) if distance_km > radius => None,
                _ => Some(Candidate {
                    operator,
                    distance_km: Some(distance_km),
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{eligible_operators, haversine_km};
    use crate::models::operator::{GeoPoint, OperatorProfile, ServiceType, Tier};
    use crate::models::request::{RequestStatus, ServiceRequest};

    fn operator(id_seed: u128, home: GeoPoint, tier: Tier) -> OperatorProfile {
        OperatorProfile {
            id: Uuid::from_u128(id_seed),
            name: "test-operator".to_string(),
            home,
            last_position: None,
            subscribed_tiers: vec![tier],
            active_tier: Some(tier),
            view_tier: Some(tier),
            radius_overrides: HashMap::new(),
            services: vec![ServiceType::Moving, ServiceType::Cleaning],
            rating: 4.5,
            certified: false,
            active_job: None,
            updated_at: Utc::now(),
        }
    }

    fn request(location: Option<GeoPoint>) -> ServiceRequest {
        ServiceRequest {
            id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            service: ServiceType::Cleaning,
            location,
            emergency: false,
            description: String::new(),
            budget: None,
            status: RequestStatus::Open,
            quote_window_expires_at: Utc::now() + chrono::Duration::hours(12),
            quote_count: 0,
            assigned_operator: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 53.5511,
            lng: 9.9937,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint {
            lat: 43.65,
            lng: -79.38,
        };
        let b = GeoPoint {
            lat: 43.7005,
            lng: -79.38,
        };
        assert_eq!(haversine_km(&a, &b), haversine_km(&b, &a));
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn manual_tier_five_km_radius_excludes_far_and_includes_near() {
        let home = GeoPoint {
            lat: 43.65,
            lng: -79.38,
        };
        let mut op = operator(1, home, Tier::Manual);
        op.radius_overrides.insert(Tier::Manual, Some(5.0));

        // about 5.6 km north of home
        let far = request(Some(GeoPoint {
            lat: 43.7005,
            lng: -79.38,
        }));
        assert!(eligible_operators(&far, [op.clone()]).is_empty());

        // about 1.1 km north of home
        let near = request(Some(GeoPoint {
            lat: 43.66,
            lng: -79.38,
        }));
        let candidates = eligible_operators(&near, [op]);
        assert_eq!(candidates.len(), 1);
        let distance = candidates[0].distance_km.unwrap();
        assert!((distance - 1.1).abs() < 0.1);
    }

    #[test]
    fn explicit_none_radius_is_unrestricted() {
        let home = GeoPoint {
            lat: 43.65,
            lng: -79.38,
        };
        let mut op = operator(1, home, Tier::Manual);
        op.radius_overrides.insert(Tier::Manual, None);

        let far = request(Some(GeoPoint {
            lat: 48.85,
            lng: 2.35,
        }));
        assert_eq!(eligible_operators(&far, [op]).len(), 1);
    }

    #[test]
    fn request_without_coordinates_is_included() {
        let op = operator(
            1,
            GeoPoint {
                lat: 43.65,
                lng: -79.38,
            },
            Tier::Manual,
        );
        let candidates = eligible_operators(&request(None), [op]);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].distance_km.is_none());
    }

    #[test]
    fn offline_operator_is_excluded() {
        let mut op = operator(
            1,
            GeoPoint {
                lat: 43.65,
                lng: -79.38,
            },
            Tier::Manual,
        );
        op.active_tier = None;

        let near = request(Some(GeoPoint {
            lat: 43.66,
            lng: -79.38,
        }));
        assert!(eligible_operators(&near, [op]).is_empty());
    }

    #[test]
    fn tier_scope_and_certification_gate_services() {
        let home = GeoPoint {
            lat: 43.65,
            lng: -79.38,
        };
        let mut req = request(Some(GeoPoint {
            lat: 43.66,
            lng: -79.38,
        }));
        req.service = ServiceType::Electrical;

        // manual tier never carries electrical work, even if the operator offers it
        let mut manual = operator(1, home, Tier::Manual);
        manual.services.push(ServiceType::Electrical);
        assert!(eligible_operators(&req, [manual]).is_empty());

        // certified tier requires the certification flag
        let mut uncertified = operator(2, home, Tier::Certified);
        uncertified.services.push(ServiceType::Electrical);
        assert!(eligible_operators(&req, [uncertified.clone()]).is_empty());

        uncertified.certified = true;
        assert_eq!(eligible_operators(&req, [uncertified]).len(), 1);
    }
}
