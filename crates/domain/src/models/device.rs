//! Device domain model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Represents a tracked device and its last known state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: i64,
    /// Normalized phone number, unique among active devices.
    pub phone_number: String,
    pub name: String,
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    pub last_location_at: Option<DateTime<Utc>>,
    pub online: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// Last known position. Present only when both coordinates are set
    /// (latitude and longitude are always written together).
    pub fn last_position(&self) -> Option<(f64, f64)> {
        match (self.last_latitude, self.last_longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// Whether the last recorded location falls within the freshness window.
    ///
    /// A device with no recorded location is never fresh.
    pub fn is_fresh(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.last_location_at
            .map(|at| now.signed_duration_since(at) <= window)
            .unwrap_or(false)
    }
}

/// Request payload for registering a device to track.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    #[validate(custom(function = "shared::validation::validate_phone_number"))]
    pub phone_number: String,

    #[validate(length(
        min = 1,
        max = 100,
        message = "Device name must be between 1 and 100 characters"
    ))]
    pub name: String,
}

impl RegisterDeviceRequest {
    /// Creates a validated registration request.
    pub fn new(phone_number: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            name: name.into(),
        }
    }
}
