use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DispatchEventKind {
    Notified,
    Assigned,
    Exhausted,
}

/// Published whenever a dispatch queue notifies, assigns, or exhausts. An
/// external notifier consumes these over the websocket feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub request_id: Uuid,
    pub operator_id: Option<Uuid>,
    pub kind: DispatchEventKind,
    pub at: DateTime<Utc>,
}
