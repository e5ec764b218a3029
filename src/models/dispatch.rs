use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EntryStatus {
    Pending,
    Notified,
    Accepted,
    Declined,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchQueueEntry {
    pub operator_id: Uuid,
    /// 1-based order within the queue.
    pub position: u32,
    pub status: EntryStatus,
    pub notified_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub distance_km: Option<f64>,
}

/// Per-emergency ordered candidate list. Advancement locks this aggregate so at
/// most one entry is `Notified` at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchQueue {
    pub request_id: Uuid,
    pub entries: Vec<DispatchQueueEntry>,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}
