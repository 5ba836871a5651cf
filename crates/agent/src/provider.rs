//! Location providers.
//!
//! `LocationProvider` abstracts the platform position source behind an async
//! pull interface. The sampler owns cadence and gating; a provider only
//! answers "where are we right now". Platform integrations supply their own
//! implementation; the simulated provider below backs development runs and
//! tests.

use chrono::Utc;
use domain::models::LocationSample;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

/// Accuracy preference passed through to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyMode {
    /// Best position the platform can produce.
    BestEffort,
    /// Trade precision for battery.
    PowerSave,
}

/// Errors a provider can return for a single acquisition.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Authorization was denied or revoked. Fatal for the stream.
    #[error("location access denied")]
    PermissionDenied,

    /// No fix could be produced this attempt. The next tick retries.
    #[error("no fix available: {0}")]
    Unavailable(String),
}

/// Platform position source.
#[async_trait::async_trait]
pub trait LocationProvider: Send + Sync {
    /// Acquire one position reading.
    async fn acquire(&self, accuracy: AccuracyMode) -> Result<LocationSample, ProviderError>;
}

/// Random-walk provider for development and tests.
///
/// Wanders from a starting position with step size and reported accuracy
/// scaled to the requested mode.
pub struct SimulatedProvider {
    state: Mutex<WalkState>,
}

struct WalkState {
    rng: StdRng,
    latitude: f64,
    longitude: f64,
}

impl SimulatedProvider {
    /// Starts the walk at the given position with an OS-seeded generator.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self::with_seed(latitude, longitude, rand::random())
    }

    /// Deterministic variant for tests.
    pub fn with_seed(latitude: f64, longitude: f64, seed: u64) -> Self {
        Self {
            state: Mutex::new(WalkState {
                rng: StdRng::seed_from_u64(seed),
                latitude,
                longitude,
            }),
        }
    }
}

#[async_trait::async_trait]
impl LocationProvider for SimulatedProvider {
    async fn acquire(&self, accuracy: AccuracyMode) -> Result<LocationSample, ProviderError> {
        let (step, accuracy_range) = match accuracy {
            AccuracyMode::BestEffort => (0.0005, 3.0..15.0),
            AccuracyMode::PowerSave => (0.002, 20.0..100.0),
        };

        let mut state = self.state.lock().await;
        let d_lat = state.rng.gen_range(-step..=step);
        let d_lon = state.rng.gen_range(-step..=step);
        state.latitude = (state.latitude + d_lat).clamp(-90.0, 90.0);
        state.longitude = (state.longitude + d_lon).clamp(-180.0, 180.0);

        Ok(LocationSample {
            latitude: state.latitude,
            longitude: state.longitude,
            timestamp: Utc::now(),
            accuracy: Some(state.rng.gen_range(accuracy_range)),
            speed: Some(state.rng.gen_range(0.0..2.0)),
            bearing: Some(state.rng.gen_range(0.0..360.0)),
        })
    }
}

/// Provider that always reports revoked access, for exercising the
/// permission-loss path.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeniedProvider;

#[async_trait::async_trait]
impl LocationProvider for DeniedProvider {
    async fn acquire(&self, _accuracy: AccuracyMode) -> Result<LocationSample, ProviderError> {
        Err(ProviderError::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[tokio::test]
    async fn test_simulated_provider_stays_in_range() {
        let provider = SimulatedProvider::with_seed(89.9999, 179.9999, 42);
        for _ in 0..50 {
            let sample = provider.acquire(AccuracyMode::PowerSave).await.unwrap();
            assert!(sample.validate().is_ok());
        }
    }

    #[tokio::test]
    async fn test_simulated_provider_moves() {
        let provider = SimulatedProvider::with_seed(37.7749, -122.4194, 7);
        let first = provider.acquire(AccuracyMode::BestEffort).await.unwrap();
        let second = provider.acquire(AccuracyMode::BestEffort).await.unwrap();
        assert!(
            first.latitude != second.latitude || first.longitude != second.longitude,
            "random walk should move between acquisitions"
        );
    }

    #[test]
    fn test_denied_provider() {
        let err = tokio_test::block_on(DeniedProvider.acquire(AccuracyMode::BestEffort))
            .unwrap_err();
        assert!(matches!(err, ProviderError::PermissionDenied));
    }
}
