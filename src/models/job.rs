use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::operator::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: String,
    pub by_operator: bool,
    pub cancelled_at: DateTime<Utc>,
    pub penalty: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedJob {
    pub id: Uuid,
    pub request_id: Uuid,
    pub operator_id: Uuid,
    pub tier: Tier,
    pub status: JobStatus,
    /// Clamped to 0..=100.
    pub progress: u8,
    pub accepted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub earnings: Option<f64>,
    pub cancellation: Option<Cancellation>,
}

/// Append-only aggregate, one row per operator + tier + period ("2026-08-23"
/// daily, "2026-08" monthly).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsEntry {
    pub operator_id: Uuid,
    pub tier: Tier,
    pub period: String,
    pub total: f64,
    pub jobs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyRecord {
    pub id: Uuid,
    pub operator_id: Uuid,
    pub tier: Tier,
    pub job_id: Uuid,
    pub amount: f64,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}
