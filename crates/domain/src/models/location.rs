//! Location sample and wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One position reading with metadata, produced by the sampler.
///
/// Samples are ephemeral: the registry and publisher consume them
/// immediately, and only the device's last-known fields survive. The device
/// binding lives on the stream that produced the sample, captured when
/// tracking started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: f64,

    pub timestamp: DateTime<Utc>,

    /// Estimated accuracy in meters.
    #[validate(custom(function = "shared::validation::validate_accuracy"))]
    pub accuracy: Option<f64>,

    /// Ground speed in meters per second.
    #[validate(custom(function = "shared::validation::validate_speed"))]
    pub speed: Option<f64>,

    /// Heading in degrees, 0-360.
    #[validate(custom(function = "shared::validation::validate_bearing"))]
    pub bearing: Option<f64>,
}

/// Request body POSTed to the remote share endpoint.
///
/// Field names are the integration contract with the remote service and
/// must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    pub phone_number: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
}

impl LocationReport {
    /// Builds the wire payload for a sample taken by the given phone number.
    pub fn from_sample(phone_number: impl Into<String>, sample: &LocationSample) -> Self {
        Self {
            phone_number: phone_number.into(),
            latitude: sample.latitude,
            longitude: sample.longitude,
            timestamp: sample.timestamp,
            accuracy: sample.accuracy,
            speed: sample.speed,
            bearing: sample.bearing,
        }
    }
}

/// Response body returned by the remote share endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReportAck {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use validator::Validate;

    fn test_sample() -> LocationSample {
        LocationSample {
            latitude: 37.7749,
            longitude: -122.4194,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            accuracy: Some(12.5),
            speed: Some(1.4),
            bearing: Some(270.0),
        }
    }

    #[test]
    fn test_sample_validation() {
        assert!(test_sample().validate().is_ok());

        let mut sample = test_sample();
        sample.latitude = 91.0;
        assert!(sample.validate().is_err());

        let mut sample = test_sample();
        sample.bearing = Some(400.0);
        assert!(sample.validate().is_err());
    }

    #[test]
    fn test_report_wire_field_names() {
        let report = LocationReport::from_sample("+15550100123", &test_sample());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["phone_number"], "+15550100123");
        assert_eq!(json["latitude"], 37.7749);
        assert_eq!(json["longitude"], -122.4194);
        assert!(json.get("timestamp").is_some());
        assert_eq!(json["accuracy"], 12.5);
        assert_eq!(json["speed"], 1.4);
        assert_eq!(json["bearing"], 270.0);
    }

    #[test]
    fn test_report_omits_absent_optionals() {
        let mut sample = test_sample();
        sample.accuracy = None;
        sample.speed = None;
        sample.bearing = None;

        let report = LocationReport::from_sample("+15550100123", &sample);
        let json = serde_json::to_value(&report).unwrap();

        assert!(json.get("accuracy").is_none());
        assert!(json.get("speed").is_none());
        assert!(json.get("bearing").is_none());
    }

    #[test]
    fn test_report_round_trip() {
        let report = LocationReport::from_sample("+15550100123", &test_sample());
        let json = serde_json::to_string(&report).unwrap();
        let parsed: LocationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_ack_parses_server_response() {
        let body = r#"{
            "success": true,
            "message": "Location shared successfully",
            "timestamp": "2024-06-01T12:00:01Z"
        }"#;
        let ack: LocationReportAck = serde_json::from_str(body).unwrap();
        assert!(ack.success);
        assert_eq!(ack.message, "Location shared successfully");
    }
}
