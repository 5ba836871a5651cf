//! Tracking session repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::entities::TrackingSessionEntity;

/// Repository for tracking-session database operations.
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Creates a new SessionRepository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a session for a device.
    ///
    /// Any session still open for the device is closed first, so at most one
    /// session per device is ever open.
    pub async fn open(
        &self,
        device_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<TrackingSessionEntity, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE tracking_sessions
            SET active = 0, ended_at = ?2
            WHERE device_id = ?1 AND active = 1
            "#,
        )
        .bind(device_id)
        .bind(started_at)
        .execute(&mut *tx)
        .await?;

        let session = sqlx::query_as::<_, TrackingSessionEntity>(
            r#"
            INSERT INTO tracking_sessions (device_id, started_at, ended_at, active)
            VALUES (?1, ?2, NULL, 1)
            RETURNING id, device_id, started_at, ended_at, active
            "#,
        )
        .bind(device_id)
        .bind(started_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(session)
    }

    /// Close a session, recording its end time.
    /// Idempotent: closing an already-closed session affects zero rows.
    pub async fn close(
        &self,
        session_id: i64,
        ended_at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE tracking_sessions
            SET active = 0, ended_at = ?2
            WHERE id = ?1 AND active = 1
            "#,
        )
        .bind(session_id)
        .bind(ended_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// The currently open session for a device, if any.
    pub async fn find_open(
        &self,
        device_id: i64,
    ) -> Result<Option<TrackingSessionEntity>, sqlx::Error> {
        sqlx::query_as::<_, TrackingSessionEntity>(
            r#"
            SELECT id, device_id, started_at, ended_at, active
            FROM tracking_sessions
            WHERE device_id = ?1 AND active = 1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Count of open sessions for a device.
    pub async fn count_open(&self, device_id: i64) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) as count
            FROM tracking_sessions
            WHERE device_id = ?1 AND active = 1
            "#,
        )
        .bind(device_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }
}
