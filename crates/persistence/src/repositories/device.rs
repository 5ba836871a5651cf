//! Device repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::entities::DeviceEntity;

/// Repository for device-related database operations.
#[derive(Clone)]
pub struct DeviceRepository {
    pool: SqlitePool,
}

impl DeviceRepository {
    /// Creates a new DeviceRepository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new active device.
    ///
    /// The partial unique index on active phone numbers rejects duplicates
    /// at the database level.
    pub async fn insert(
        &self,
        phone_number: &str,
        name: &str,
    ) -> Result<DeviceEntity, sqlx::Error> {
        sqlx::query_as::<_, DeviceEntity>(
            r#"
            INSERT INTO devices (phone_number, name, online, active, created_at)
            VALUES (?1, ?2, 0, 1, ?3)
            RETURNING id, phone_number, name, last_latitude, last_longitude,
                      last_location_at, online, active, created_at
            "#,
        )
        .bind(phone_number)
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    /// Find an active device by its id.
    pub async fn find_active_by_id(&self, id: i64) -> Result<Option<DeviceEntity>, sqlx::Error> {
        sqlx::query_as::<_, DeviceEntity>(
            r#"
            SELECT id, phone_number, name, last_latitude, last_longitude,
                   last_location_at, online, active, created_at
            FROM devices
            WHERE id = ?1 AND active = 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Find an active device by its normalized phone number (exact match).
    pub async fn find_active_by_phone_number(
        &self,
        phone_number: &str,
    ) -> Result<Option<DeviceEntity>, sqlx::Error> {
        sqlx::query_as::<_, DeviceEntity>(
            r#"
            SELECT id, phone_number, name, last_latitude, last_longitude,
                   last_location_at, online, active, created_at
            FROM devices
            WHERE phone_number = ?1 AND active = 1
            "#,
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await
    }

    /// All active devices, most recently located first, never-located last.
    pub async fn list_active(&self) -> Result<Vec<DeviceEntity>, sqlx::Error> {
        sqlx::query_as::<_, DeviceEntity>(
            r#"
            SELECT id, phone_number, name, last_latitude, last_longitude,
                   last_location_at, online, active, created_at
            FROM devices
            WHERE active = 1
            ORDER BY last_location_at DESC NULLS LAST, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Active devices currently flagged online.
    pub async fn list_online(&self) -> Result<Vec<DeviceEntity>, sqlx::Error> {
        sqlx::query_as::<_, DeviceEntity>(
            r#"
            SELECT id, phone_number, name, last_latitude, last_longitude,
                   last_location_at, online, active, created_at
            FROM devices
            WHERE online = 1 AND active = 1
            ORDER BY last_location_at DESC NULLS LAST, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Every row regardless of the active flag. Removed devices keep their
    /// history, and this is how that history is inspected.
    pub async fn list_all(&self) -> Result<Vec<DeviceEntity>, sqlx::Error> {
        sqlx::query_as::<_, DeviceEntity>(
            r#"
            SELECT id, phone_number, name, last_latitude, last_longitude,
                   last_location_at, online, active, created_at
            FROM devices
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Deactivate a device (soft delete).
    /// Returns the number of rows affected (0 if already inactive or unknown).
    pub async fn deactivate(&self, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET active = 0
            WHERE id = ?1 AND active = 1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Upsert the last known position and flip the device online.
    /// Returns the number of rows affected (0 if the device is unknown or
    /// inactive).
    pub async fn record_location(
        &self,
        id: i64,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET last_latitude = ?2, last_longitude = ?3, last_location_at = ?4, online = 1
            WHERE id = ?1 AND active = 1
            "#,
        )
        .bind(id)
        .bind(latitude)
        .bind(longitude)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Direct online flag write, independent of any location update.
    /// Returns the number of rows affected.
    pub async fn set_online(&self, id: i64, online: bool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET online = ?2
            WHERE id = ?1 AND active = 1
            "#,
        )
        .bind(id)
        .bind(online)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
