use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::operator::{GeoPoint, ServiceType, Tier};

/// A request never expires on its own: a closed quote window only expires the
/// negotiation and the request stays `Open` for re-matching.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RequestStatus {
    Open,
    Assigned,
    Accepted,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub service: ServiceType,
    pub location: Option<GeoPoint>,
    pub emergency: bool,
    pub description: String,
    /// Free-form estimate such as "$40-$60"; parsed only for penalty valuation.
    pub budget: Option<String>,
    pub status: RequestStatus,
    pub quote_window_expires_at: DateTime<Utc>,
    pub quote_count: u32,
    pub assigned_operator: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum QuoteStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub request_id: Uuid,
    pub operator_id: Uuid,
    /// The operator's online tier when the quote was submitted.
    pub tier: Tier,
    pub price: f64,
    pub eta_minutes: i64,
    pub status: QuoteStatus,
    pub submitted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NegotiationStatus {
    Open,
    Resolved,
    Expired,
}

/// Per-request quote board. Quote mutations lock this aggregate, so accepting
/// one quote and declining its siblings is a single transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Negotiation {
    pub request_id: Uuid,
    pub status: NegotiationStatus,
    pub window_expires_at: DateTime<Utc>,
    pub quotes: Vec<Quote>,
}
