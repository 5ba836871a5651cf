//! Sharing state entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database row mapping for the single-row sharing_state table.
#[derive(Debug, Clone, FromRow)]
pub struct SharingStateEntity {
    pub id: i64,
    pub enabled: bool,
    pub last_published_at: Option<DateTime<Utc>>,
}

impl From<SharingStateEntity> for domain::models::SharingState {
    fn from(entity: SharingStateEntity) -> Self {
        Self {
            enabled: entity.enabled,
            last_published_at: entity.last_published_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sharing_state_entity_to_domain() {
        let entity = SharingStateEntity {
            id: 1,
            enabled: true,
            last_published_at: Some(Utc::now()),
        };

        let state: domain::models::SharingState = entity.clone().into();
        assert!(state.enabled);
        assert_eq!(state.last_published_at, entity.last_published_at);
    }
}
