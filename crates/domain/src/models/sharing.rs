//! Persisted sharing state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-wide sharing state, persisted across restarts.
///
/// `enabled` drives boot-time auto-resume; `last_published_at` is the last
/// publish the remote endpoint acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingState {
    pub enabled: bool,
    pub last_published_at: Option<DateTime<Utc>>,
}
