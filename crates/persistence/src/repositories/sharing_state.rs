//! Sharing state repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::entities::SharingStateEntity;

/// Repository for the single-row sharing_state table.
#[derive(Clone)]
pub struct SharingStateRepository {
    pool: SqlitePool,
}

impl SharingStateRepository {
    /// Creates a new SharingStateRepository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the persisted sharing state, creating the row on first read.
    pub async fn load(&self) -> Result<SharingStateEntity, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO sharing_state (id, enabled) VALUES (1, 0)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, SharingStateEntity>(
            r#"
            SELECT id, enabled, last_published_at
            FROM sharing_state
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await
    }

    /// Persist the enabled flag.
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO sharing_state (id, enabled) VALUES (1, ?1)
            ON CONFLICT (id) DO UPDATE SET enabled = excluded.enabled
            "#,
        )
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist the timestamp of the last acknowledged publish.
    pub async fn record_publish(&self, published_at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO sharing_state (id, enabled, last_published_at) VALUES (1, 0, ?1)
            ON CONFLICT (id) DO UPDATE SET last_published_at = excluded.last_published_at
            "#,
        )
        .bind(published_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
