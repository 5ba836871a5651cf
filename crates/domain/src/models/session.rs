//! Tracking session domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One contiguous interval during which the background task runs for a
/// device. At most one session per device is open at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSession {
    pub id: i64,
    pub device_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl TrackingSession {
    /// Whether the session is still open (no end time recorded).
    pub fn is_open(&self) -> bool {
        self.active && self.ended_at.is_none()
    }
}
