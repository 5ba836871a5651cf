//! Location sampler.
//!
//! Turns a `LocationProvider` into a lazy, cancellable sequence of samples
//! gated by interval, displacement, and a maximum delivery delay. Samples
//! for one stream are delivered strictly in timestamp order, and the
//! bounded channel keeps at most one sample in flight: production waits for
//! consumption, never the other way around.

use std::sync::Arc;
use std::time::Duration;

use domain::models::LocationSample;
use geo::{point, HaversineDistance};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::provider::{AccuracyMode, LocationProvider, ProviderError};

/// Sampling cadence and gating configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Minimum interval between samples.
    pub interval: Duration,
    /// Minimum movement required to deliver a new sample.
    pub min_displacement_m: f64,
    /// Deliver a sample at least this often even without movement.
    pub max_delay: Duration,
    /// Accuracy preference handed to the provider.
    pub accuracy: AccuracyMode,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        // 5-minute cadence, 10 m movement gate, forced delivery after two
        // missed intervals
        Self {
            interval: Duration::from_secs(300),
            min_displacement_m: 10.0,
            max_delay: Duration::from_secs(600),
            accuracy: AccuracyMode::BestEffort,
        }
    }
}

/// Errors delivered through a sample stream.
#[derive(Error, Debug)]
pub enum SamplerError {
    /// Authorization was revoked. The stream ends after this item.
    #[error("location access denied")]
    PermissionDenied,

    /// The provider failed this tick. The stream continues.
    #[error("provider error: {0}")]
    Provider(String),
}

/// Receiving half of a running sampler.
pub struct SampleStream {
    rx: mpsc::Receiver<Result<LocationSample, SamplerError>>,
}

impl SampleStream {
    /// Next item, in strict emission order. Returns `None` once the sampler
    /// has been stopped or the stream has terminated.
    pub async fn next_sample(&mut self) -> Option<Result<LocationSample, SamplerError>> {
        self.rx.recv().await
    }
}

/// Pull-based sampler over a location provider.
pub struct LocationSampler<P: LocationProvider + 'static> {
    provider: Arc<P>,
    active: Option<ActiveSampling>,
}

struct ActiveSampling {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<P: LocationProvider + 'static> LocationSampler<P> {
    /// Creates a sampler over the given provider.
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            active: None,
        }
    }

    /// Whether the sampling task is currently running.
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| !a.task.is_finished())
            .unwrap_or(false)
    }

    /// Start sampling and return the stream of samples.
    ///
    /// Starting while already running is a no-op returning `None`; the
    /// stream handed out earlier stays the only one.
    pub fn start(&mut self, config: SamplerConfig) -> Option<SampleStream> {
        if let Some(active) = &self.active {
            if !active.task.is_finished() {
                debug!("Sampler already running, start is a no-op");
                return None;
            }
            // the previous stream terminated on its own (access revoked)
            self.active = None;
        }

        let (tx, rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let provider = Arc::clone(&self.provider);
        let task = tokio::spawn(run_sampling(provider, config, tx, shutdown_rx));

        self.active = Some(ActiveSampling { shutdown_tx, task });
        Some(SampleStream { rx })
    }

    /// Stop sampling and release the provider.
    ///
    /// Waits for the sampling task to exit; no further samples are produced
    /// after this returns. Stopping a stopped sampler is a no-op.
    pub async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.shutdown_tx.send(true);
            if let Err(e) = active.task.await {
                warn!("Sampling task panicked: {}", e);
            }
        }
    }
}

async fn run_sampling<P: LocationProvider>(
    provider: Arc<P>,
    config: SamplerConfig,
    tx: mpsc::Sender<Result<LocationSample, SamplerError>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_delivered: Option<LocationSample> = None;
    let mut last_delivery_at: Option<Instant> = None;

    info!(
        interval_secs = config.interval.as_secs(),
        min_displacement_m = config.min_displacement_m,
        "Sampling started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let sample = match provider.acquire(config.accuracy).await {
                    Ok(sample) => sample,
                    Err(ProviderError::PermissionDenied) => {
                        warn!("Location access revoked, ending sample stream");
                        let _ = tx.send(Err(SamplerError::PermissionDenied)).await;
                        return;
                    }
                    Err(ProviderError::Unavailable(reason)) => {
                        debug!(reason = %reason, "No fix this tick");
                        if !deliver(&tx, &mut shutdown_rx, Err(SamplerError::Provider(reason))).await {
                            return;
                        }
                        continue;
                    }
                };

                // never move backwards in time within one stream
                if let Some(prev) = &last_delivered {
                    if sample.timestamp < prev.timestamp {
                        debug!("Dropping out-of-order fix");
                        continue;
                    }
                }

                let moved_enough = match &last_delivered {
                    Some(prev) => displacement_m(prev, &sample) >= config.min_displacement_m,
                    None => true,
                };
                let overdue = last_delivery_at
                    .map(|at| at.elapsed() >= config.max_delay)
                    .unwrap_or(true);
                if !moved_enough && !overdue {
                    debug!("Sample below displacement threshold, suppressed");
                    continue;
                }

                if !deliver(&tx, &mut shutdown_rx, Ok(sample.clone())).await {
                    return;
                }
                last_delivered = Some(sample);
                last_delivery_at = Some(Instant::now());
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Sampling stopped");
                    return;
                }
            }
        }
    }
}

/// Hand one item to the consumer, or bail out on shutdown or a dropped
/// stream. Returns false when the loop should exit.
async fn deliver(
    tx: &mpsc::Sender<Result<LocationSample, SamplerError>>,
    shutdown_rx: &mut watch::Receiver<bool>,
    item: Result<LocationSample, SamplerError>,
) -> bool {
    tokio::select! {
        sent = tx.send(item) => sent.is_ok(),
        // the only write to the shutdown channel is stop()
        _ = shutdown_rx.changed() => {
            info!("Sampling stopped");
            false
        }
    }
}

fn displacement_m(a: &LocationSample, b: &LocationSample) -> f64 {
    let from = point!(x: a.longitude, y: a.latitude);
    let to = point!(x: b.longitude, y: b.latitude);
    from.haversine_distance(&to)
}
