//! Device entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database row mapping for the devices table.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceEntity {
    pub id: i64,
    pub phone_number: String,
    pub name: String,
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    pub last_location_at: Option<DateTime<Utc>>,
    pub online: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DeviceEntity> for domain::models::Device {
    fn from(entity: DeviceEntity) -> Self {
        Self {
            id: entity.id,
            phone_number: entity.phone_number,
            name: entity.name,
            last_latitude: entity.last_latitude,
            last_longitude: entity.last_longitude,
            last_location_at: entity.last_location_at,
            online: entity.online,
            active: entity.active,
            created_at: entity.created_at,
        }
    }
}
