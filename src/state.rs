use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::dispatch::DispatchQueue;
use crate::models::event::DispatchEvent;
use crate::models::job::{AcceptedJob, EarningsEntry, PenaltyRecord};
use crate::models::operator::OperatorProfile;
use crate::models::request::{Negotiation, ServiceRequest};
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub dispatch_fanout: usize,
    pub dispatch_entry_ttl: chrono::Duration,
    pub quote_window: chrono::Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dispatch_fanout: 5,
            dispatch_entry_ttl: chrono::Duration::minutes(10),
            quote_window: chrono::Duration::hours(12),
        }
    }
}

/// Shared store. The three aggregates that need transactional mutation
/// (operator presence/job guard, dispatch queue, negotiation) are each a single
/// map entry, so `get_mut` gives the required atomicity region.
pub struct AppState {
    pub settings: Settings,
    pub operators: DashMap<Uuid, OperatorProfile>,
    pub requests: DashMap<Uuid, ServiceRequest>,
    pub negotiations: DashMap<Uuid, Negotiation>,
    pub dispatch_queues: DashMap<Uuid, DispatchQueue>,
    pub jobs: DashMap<Uuid, AcceptedJob>,
    pub earnings: DashMap<String, EarningsEntry>,
    pub penalties: DashMap<Uuid, PenaltyRecord>,
    pub dispatch_events_tx: broadcast::Sender<DispatchEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(settings: Settings, event_buffer_size: usize) -> Self {
        let (dispatch_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            settings,
            operators: DashMap::new(),
            requests: DashMap::new(),
            negotiations: DashMap::new(),
            dispatch_queues: DashMap::new(),
            jobs: DashMap::new(),
            earnings: DashMap::new(),
            penalties: DashMap::new(),
            dispatch_events_tx,
            metrics: Metrics::new(),
        }
    }
}
