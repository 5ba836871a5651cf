//! Tracking session entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database row mapping for the tracking_sessions table.
#[derive(Debug, Clone, FromRow)]
pub struct TrackingSessionEntity {
    pub id: i64,
    pub device_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl From<TrackingSessionEntity> for domain::models::TrackingSession {
    fn from(entity: TrackingSessionEntity) -> Self {
        Self {
            id: entity.id,
            device_id: entity.device_id,
            started_at: entity.started_at,
            ended_at: entity.ended_at,
            active: entity.active,
        }
    }
}
