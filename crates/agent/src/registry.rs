//! Device registry.
//!
//! Validates registration requests, owns the device store, and publishes
//! the refreshed active-device list to observers after every mutation.

use chrono::{Duration, Utc};
use domain::models::{Device, LocationSample, RegisterDeviceRequest};
use persistence::repositories::DeviceRepository;
use shared::validation::normalize_phone_number;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;
use validator::Validate;

/// Errors surfaced by registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Device with phone number {0} already exists")]
    Duplicate(String),

    #[error("Device {0} not found")]
    NotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistent store of tracked devices and their last known state.
///
/// Change notification is best-effort: every successful mutation sends the
/// active-device list through a watch channel, and a send never blocks or
/// fails the write that triggered it.
pub struct DeviceRegistry {
    devices: DeviceRepository,
    freshness_window: Duration,
    changes: watch::Sender<Vec<Device>>,
}

impl DeviceRegistry {
    /// Creates a registry over the given pool.
    ///
    /// `freshness_window` bounds how long a recorded location keeps a device
    /// online on the read path.
    pub fn new(pool: SqlitePool, freshness_window: Duration) -> Self {
        let (changes, _) = watch::channel(Vec::new());
        Self {
            devices: DeviceRepository::new(pool),
            freshness_window,
            changes,
        }
    }

    /// Subscribe to active-device list updates.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Device>> {
        self.changes.subscribe()
    }

    /// Register a new device to track.
    ///
    /// The phone number is normalized before storage and must be unique
    /// among active devices.
    pub async fn add(&self, request: RegisterDeviceRequest) -> Result<Device, RegistryError> {
        request
            .validate()
            .map_err(|e| RegistryError::Validation(validation_message(&e)))?;

        let phone_number = normalize_phone_number(&request.phone_number);
        if self
            .devices
            .find_active_by_phone_number(&phone_number)
            .await?
            .is_some()
        {
            return Err(RegistryError::Duplicate(phone_number));
        }

        let entity = match self.devices.insert(&phone_number, request.name.trim()).await {
            Ok(entity) => entity,
            // the partial unique index catches registrations racing past the
            // lookup above
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(RegistryError::Duplicate(phone_number));
            }
            Err(e) => return Err(e.into()),
        };

        metrics::counter!("devices_registered_total").increment(1);
        let device = self.into_device(entity);
        self.notify().await;
        Ok(device)
    }

    /// Mark a device inactive, retaining its history.
    ///
    /// Idempotent: removing an already-inactive or unknown device is a
    /// no-op success.
    pub async fn remove(&self, device_id: i64) -> Result<(), RegistryError> {
        let removed = self.devices.deactivate(device_id).await?;
        if removed > 0 {
            self.notify().await;
        }
        Ok(())
    }

    /// The active device with this id, if any.
    pub async fn get_by_id(&self, device_id: i64) -> Result<Option<Device>, RegistryError> {
        let entity = self.devices.find_active_by_id(device_id).await?;
        Ok(entity.map(|e| self.into_device(e)))
    }

    /// The active device registered under this phone number, if any.
    /// The lookup normalizes its input, so formatting differences don't
    /// matter; the digits must match exactly.
    pub async fn get_by_phone_number(
        &self,
        phone_number: &str,
    ) -> Result<Option<Device>, RegistryError> {
        let normalized = normalize_phone_number(phone_number);
        let entity = self.devices.find_active_by_phone_number(&normalized).await?;
        Ok(entity.map(|e| self.into_device(e)))
    }

    /// All active devices, most recently located first, never-located last.
    pub async fn list_active(&self) -> Result<Vec<Device>, RegistryError> {
        let entities = self.devices.list_active().await?;
        Ok(entities.into_iter().map(|e| self.into_device(e)).collect())
    }

    /// Active devices whose last location is still fresh.
    pub async fn list_online(&self) -> Result<Vec<Device>, RegistryError> {
        let entities = self.devices.list_online().await?;
        Ok(entities
            .into_iter()
            .map(|e| self.into_device(e))
            .filter(|d| d.online)
            .collect())
    }

    /// Every stored device, including removed ones. Removed devices keep
    /// their history; this is the way to inspect it.
    pub async fn list_all(&self) -> Result<Vec<Device>, RegistryError> {
        let entities = self.devices.list_all().await?;
        Ok(entities.into_iter().map(|e| self.into_device(e)).collect())
    }

    /// Record a position sample against a device and flip it online.
    pub async fn record_location(
        &self,
        device_id: i64,
        sample: &LocationSample,
    ) -> Result<(), RegistryError> {
        sample
            .validate()
            .map_err(|e| RegistryError::Validation(validation_message(&e)))?;

        let updated = self
            .devices
            .record_location(device_id, sample.latitude, sample.longitude, sample.timestamp)
            .await?;
        if updated == 0 {
            return Err(RegistryError::NotFound(device_id));
        }

        metrics::counter!("locations_recorded_total").increment(1);
        self.notify().await;
        Ok(())
    }

    /// Direct online flag write, used when no location is concurrently
    /// recorded (explicit offline detection).
    pub async fn set_online_status(
        &self,
        device_id: i64,
        online: bool,
    ) -> Result<(), RegistryError> {
        let updated = self.devices.set_online(device_id, online).await?;
        if updated == 0 {
            return Err(RegistryError::NotFound(device_id));
        }
        self.notify().await;
        Ok(())
    }

    /// Maps a row into the domain model, degrading the online flag once the
    /// freshness window has lapsed. The stored flag reflects the last write;
    /// physically flipping stale rows belongs to a separate housekeeping
    /// task.
    fn into_device(&self, entity: persistence::entities::DeviceEntity) -> Device {
        let mut device: Device = entity.into();
        device.online = device.online && device.is_fresh(self.freshness_window, Utc::now());
        device
    }

    async fn notify(&self) {
        match self.devices.list_active().await {
            Ok(entities) => {
                let devices = entities.into_iter().map(|e| self.into_device(e)).collect();
                // send only fails with no subscribers, which is fine
                let _ = self.changes.send(devices);
            }
            Err(e) => warn!(error = %e, "Failed to refresh device list for observers"),
        }
    }
}

fn validation_message(errors: &validator::ValidationErrors) -> String {
    let messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(_, errors)| errors.iter())
        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .collect();

    if messages.len() == 1 {
        messages[0].clone()
    } else {
        format!("{} validation errors", messages.len())
    }
}
