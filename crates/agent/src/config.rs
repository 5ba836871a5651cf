use serde::Deserialize;
use std::time::Duration;

use persistence::db::DatabaseConfig;

use crate::provider::AccuracyMode;
use crate::sampler::SamplerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sampling: SamplingConfig,

    pub sharing: SharingConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Sampling cadence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Movement required before a new sample is delivered.
    #[serde(default = "default_min_displacement")]
    pub min_displacement_m: f64,

    /// Force a delivery after this long even without movement.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    #[serde(default = "default_accuracy")]
    pub accuracy: AccuracyMode,

    /// Starting position for the built-in simulated provider.
    #[serde(default = "default_start_latitude")]
    pub start_latitude: f64,

    #[serde(default = "default_start_longitude")]
    pub start_longitude: f64,
}

impl SamplingConfig {
    /// The sampler-facing view of this section.
    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_secs(self.interval_secs),
            min_displacement_m: self.min_displacement_m,
            max_delay: Duration::from_secs(self.max_delay_secs),
            accuracy: self.accuracy,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            min_displacement_m: default_min_displacement(),
            max_delay_secs: default_max_delay(),
            accuracy: default_accuracy(),
            start_latitude: default_start_latitude(),
            start_longitude: default_start_longitude(),
        }
    }
}

/// Remote share endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SharingConfig {
    /// Share endpoint URL, e.g. `https://tracker.example.com/api/location/share`.
    pub endpoint: String,

    /// Phone number this endpoint reports as in the companion role.
    pub phone_number: String,

    /// Display name used when the companion registers itself locally.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Total request timeout, connect and transfer included.
    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,
}

/// Which role this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Companion,
    Tracker,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_role")]
    pub role: RoleKind,

    /// Device the tracker role records against. Required for that role.
    pub device_id: Option<i64>,

    /// How long a recorded location keeps a device online.
    #[serde(default = "default_freshness_window")]
    pub freshness_window_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            device_id: None,
            freshness_window_secs: default_freshness_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_interval() -> u64 {
    300
}
fn default_min_displacement() -> f64 {
    10.0
}
fn default_max_delay() -> u64 {
    600
}
fn default_accuracy() -> AccuracyMode {
    AccuracyMode::BestEffort
}
fn default_start_latitude() -> f64 {
    37.7749
}
fn default_start_longitude() -> f64 {
    -122.4194
}
fn default_device_name() -> String {
    "Companion".to_string()
}
fn default_publish_timeout() -> u64 {
    30
}
fn default_role() -> RoleKind {
    RoleKind::Companion
}
fn default_freshness_window() -> u64 {
    900
}
fn default_metrics_addr() -> String {
    "127.0.0.1:9464".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with PT__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("PT").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.sharing.endpoint.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "sharing.endpoint".to_string(),
            ));
        }
        if shared::validation::validate_phone_number(&self.sharing.phone_number).is_err() {
            return Err(ConfigValidationError::InvalidValue(
                "sharing.phone_number is not a valid phone number".to_string(),
            ));
        }
        if self.tracking.role == RoleKind::Tracker && self.tracking.device_id.is_none() {
            return Err(ConfigValidationError::MissingRequired(
                "tracking.device_id".to_string(),
            ));
        }
        if self.sampling.interval_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "sampling.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.sampling.max_delay_secs < self.sampling.interval_secs {
            return Err(ConfigValidationError::InvalidValue(
                "sampling.max_delay_secs must not be shorter than the interval".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Builds entirely from embedded defaults and overrides, without
    /// touching config files.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [sharing]
            endpoint = "https://tracker.example.com/api/location/share"
            phone_number = "+15550100123"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }
}
