//! Common validation utilities.

use validator::ValidationError;

/// Minimum length of a phone number after stripping formatting characters.
const MIN_PHONE_LENGTH: usize = 10;

/// Maximum length of a phone number after stripping formatting characters.
const MAX_PHONE_LENGTH: usize = 15;

lazy_static::lazy_static! {
    static ref PHONE_FORMATTING: regex::Regex = regex::Regex::new(r"[^0-9+]").unwrap();
}

/// Strips formatting characters from a phone number, keeping digits and `+`.
///
/// `"+1 (555) 010-0123"` normalizes to `"+15550100123"`. The normalized form
/// is what gets stored and compared for uniqueness.
pub fn normalize_phone_number(raw: &str) -> String {
    PHONE_FORMATTING.replace_all(raw, "").into_owned()
}

/// Validates that a phone number is non-empty and has an acceptable length
/// (10 to 15 characters after stripping everything but digits and `+`).
pub fn validate_phone_number(raw: &str) -> Result<(), ValidationError> {
    if raw.trim().is_empty() {
        let mut err = ValidationError::new("phone_required");
        err.message = Some("Phone number is required".into());
        return Err(err);
    }

    let normalized = normalize_phone_number(raw);
    if !(MIN_PHONE_LENGTH..=MAX_PHONE_LENGTH).contains(&normalized.len()) {
        let mut err = ValidationError::new("phone_format");
        err.message = Some("Invalid phone number format".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a latitude value is within valid range (-90 to 90).
pub fn validate_latitude(lat: f64) -> Result<(), ValidationError> {
    if (-90.0..=90.0).contains(&lat) {
        Ok(())
    } else {
        let mut err = ValidationError::new("latitude_range");
        err.message = Some("Latitude must be between -90 and 90".into());
        Err(err)
    }
}

/// Validates that a longitude value is within valid range (-180 to 180).
pub fn validate_longitude(lon: f64) -> Result<(), ValidationError> {
    if (-180.0..=180.0).contains(&lon) {
        Ok(())
    } else {
        let mut err = ValidationError::new("longitude_range");
        err.message = Some("Longitude must be between -180 and 180".into());
        Err(err)
    }
}

/// Validates that accuracy is non-negative.
pub fn validate_accuracy(accuracy: f64) -> Result<(), ValidationError> {
    if accuracy >= 0.0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("accuracy_range");
        err.message = Some("Accuracy must be non-negative".into());
        Err(err)
    }
}

/// Validates that bearing is within valid range (0 to 360).
pub fn validate_bearing(bearing: f64) -> Result<(), ValidationError> {
    if (0.0..=360.0).contains(&bearing) {
        Ok(())
    } else {
        let mut err = ValidationError::new("bearing_range");
        err.message = Some("Bearing must be between 0 and 360".into());
        Err(err)
    }
}

/// Validates that speed is non-negative.
pub fn validate_speed(speed: f64) -> Result<(), ValidationError> {
    if speed >= 0.0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("speed_range");
        err.message = Some("Speed must be non-negative".into());
        Err(err)
    }
}
