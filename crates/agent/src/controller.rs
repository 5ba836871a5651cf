//! Tracking controller.
//!
//! State machine owning the background tracking task. It wires the sampler
//! into the registry (tracker role) or the publisher (companion role),
//! persists the enabled flag so tracking survives restarts, and drains
//! in-flight work before `stop()` returns.

use std::sync::Arc;

use chrono::Utc;
use domain::models::{LocationReport, LocationSample, SharingState};
use domain::services::{Access, Authorization};
use persistence::repositories::{SessionRepository, SharingStateRepository};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::provider::{AccuracyMode, LocationProvider};
use crate::publisher::{LocationPublisher, PublishOutcome};
use crate::registry::{DeviceRegistry, RegistryError};
use crate::sampler::{LocationSampler, SampleStream, SamplerConfig, SamplerError};

/// Controller lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Stopped => write!(f, "stopped"),
            ControllerState::Starting => write!(f, "starting"),
            ControllerState::Running => write!(f, "running"),
            ControllerState::Stopping => write!(f, "stopping"),
        }
    }
}

/// What the background task does with each sample.
///
/// The device binding is captured here, before `start()`, so there is no
/// window where the task is polling with nothing bound.
#[derive(Debug, Clone)]
pub enum TrackingRole {
    /// Record samples against a registered device.
    Tracker { device_id: i64 },
    /// Publish samples to the remote share endpoint as this phone number.
    /// The registry row for the local device anchors the session.
    Companion { device_id: i64, phone_number: String },
}

impl TrackingRole {
    /// The registry device this role's sessions bind to.
    pub fn device_id(&self) -> i64 {
        match self {
            TrackingRole::Tracker { device_id } => *device_id,
            TrackingRole::Companion { device_id, .. } => *device_id,
        }
    }
}

impl std::fmt::Display for TrackingRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingRole::Tracker { .. } => write!(f, "tracker"),
            TrackingRole::Companion { .. } => write!(f, "companion"),
        }
    }
}

/// Errors surfaced by controller operations.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("required access not granted")]
    PermissionDenied,

    #[error("device {0} is not registered")]
    UnknownDevice(i64),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Snapshot returned to the presentation layer.
#[derive(Debug, Clone)]
pub struct TrackingStatus {
    pub state: ControllerState,
    pub sharing: SharingState,
}

/// State machine that owns the background tracking task.
pub struct TrackingController<P: LocationProvider + 'static> {
    role: TrackingRole,
    registry: Arc<DeviceRegistry>,
    publisher: Arc<LocationPublisher>,
    sessions: SessionRepository,
    sharing: SharingStateRepository,
    authorization: Arc<dyn Authorization>,
    sampler_config: SamplerConfig,
    state: Arc<watch::Sender<ControllerState>>,
    inner: Mutex<Inner<P>>,
}

struct Inner<P: LocationProvider + 'static> {
    sampler: LocationSampler<P>,
    session_id: Option<i64>,
    task: Option<JoinHandle<()>>,
}

impl<P: LocationProvider + 'static> TrackingController<P> {
    /// Wires a controller for the given role.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        role: TrackingRole,
        provider: Arc<P>,
        registry: Arc<DeviceRegistry>,
        publisher: Arc<LocationPublisher>,
        sessions: SessionRepository,
        sharing: SharingStateRepository,
        authorization: Arc<dyn Authorization>,
        sampler_config: SamplerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ControllerState::Stopped);
        Self {
            role,
            registry,
            publisher,
            sessions,
            sharing,
            authorization,
            sampler_config,
            state: Arc::new(state),
            inner: Mutex::new(Inner {
                sampler: LocationSampler::new(provider),
                session_id: None,
                task: None,
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    /// Lifecycle state plus the persisted sharing snapshot.
    pub async fn status(&self) -> Result<TrackingStatus, ControllerError> {
        let sharing = self.sharing.load().await?.into();
        Ok(TrackingStatus {
            state: self.state(),
            sharing,
        })
    }

    /// Start tracking.
    ///
    /// Idempotent: calling while already starting or running returns the
    /// current state without side effects. On success a session is open,
    /// the background task is running, and the enabled flag is persisted.
    pub async fn start(&self) -> Result<ControllerState, ControllerError> {
        let mut inner = self.inner.lock().await;

        let state = self.state();
        if matches!(state, ControllerState::Starting | ControllerState::Running) {
            info!(state = %state, "Tracking already active, start is a no-op");
            return Ok(state);
        }
        self.set_state(ControllerState::Starting);

        match self.start_locked(&mut inner).await {
            Ok(state) => Ok(state),
            Err(e) => {
                self.set_state(ControllerState::Stopped);
                Err(e)
            }
        }
    }

    async fn start_locked(&self, inner: &mut Inner<P>) -> Result<ControllerState, ControllerError> {
        if !self
            .authorization
            .all_granted(&self.required_access())
            .await
        {
            warn!(role = %self.role, "Tracking not started, access denied");
            return Err(ControllerError::PermissionDenied);
        }

        let device_id = self.role.device_id();
        if self.registry.get_by_id(device_id).await?.is_none() {
            return Err(ControllerError::UnknownDevice(device_id));
        }

        let session = self.sessions.open(device_id, Utc::now()).await?;
        inner.session_id = Some(session.id);
        self.sharing.set_enabled(true).await?;

        let Some(stream) = inner.sampler.start(self.sampler_config.clone()) else {
            // sampler survived a previous run; treat the task as live
            warn!("Sampler already running while starting, keeping it");
            self.set_state(ControllerState::Running);
            return Ok(ControllerState::Running);
        };

        let ctx = TaskContext {
            role: self.role.clone(),
            registry: Arc::clone(&self.registry),
            publisher: Arc::clone(&self.publisher),
            sessions: self.sessions.clone(),
            sharing: self.sharing.clone(),
            state: Arc::clone(&self.state),
            session_id: session.id,
        };

        // Running is published before the task spawns, so a task that tears
        // itself down immediately cannot have its Stopped overwritten
        self.set_state(ControllerState::Running);
        inner.task = Some(tokio::spawn(run_tracking(stream, ctx)));

        info!(role = %self.role, device_id, session_id = session.id, "Tracking started");
        Ok(ControllerState::Running)
    }

    /// Stop tracking.
    ///
    /// Cancels the sampler, waits for the in-flight sample to finish
    /// processing, closes the open session, and clears the persisted
    /// enabled flag. Idempotent: stopping while stopped or stopping is a
    /// no-op returning the current state.
    pub async fn stop(&self) -> Result<ControllerState, ControllerError> {
        let mut inner = self.inner.lock().await;

        let state = self.state();
        if matches!(state, ControllerState::Stopped | ControllerState::Stopping) {
            info!(state = %state, "Tracking already inactive, stop is a no-op");
            return Ok(state);
        }
        self.set_state(ControllerState::Stopping);

        // no samples are produced after this returns
        inner.sampler.stop().await;

        // the task drains whatever was in flight, then sees the closed
        // stream and exits
        if let Some(task) = inner.task.take() {
            if let Err(e) = task.await {
                warn!("Tracking task panicked: {}", e);
            }
        }

        let result = self.close_session(&mut inner).await;
        self.set_state(ControllerState::Stopped);
        result?;

        info!(role = %self.role, "Tracking stopped");
        Ok(ControllerState::Stopped)
    }

    async fn close_session(&self, inner: &mut Inner<P>) -> Result<(), ControllerError> {
        if let Some(session_id) = inner.session_id.take() {
            self.sessions.close(session_id, Utc::now()).await?;
        }
        self.sharing.set_enabled(false).await?;
        Ok(())
    }

    /// Boot-time recovery: resume tracking if the persisted flag says it
    /// was enabled when the process last ran.
    ///
    /// Invoked by the boot collaborator; the controller never watches for
    /// boot events itself.
    pub async fn resume_if_enabled(&self) -> Result<ControllerState, ControllerError> {
        let state = self.sharing.load().await?;
        if state.enabled {
            info!("Tracking was enabled before restart, resuming");
            self.start().await
        } else {
            Ok(self.state())
        }
    }

    fn set_state(&self, state: ControllerState) {
        let _ = self.state.send(state);
    }

    fn required_access(&self) -> Vec<Access> {
        let mut access = match self.sampler_config.accuracy {
            AccuracyMode::BestEffort => vec![Access::FineLocation],
            AccuracyMode::PowerSave => vec![Access::CoarseLocation],
        };
        if matches!(self.role, TrackingRole::Companion { .. }) {
            access.push(Access::TelephonyRead);
        }
        access
    }
}

struct TaskContext {
    role: TrackingRole,
    registry: Arc<DeviceRegistry>,
    publisher: Arc<LocationPublisher>,
    sessions: SessionRepository,
    sharing: SharingStateRepository,
    state: Arc<watch::Sender<ControllerState>>,
    session_id: i64,
}

async fn run_tracking(mut stream: SampleStream, ctx: TaskContext) {
    while let Some(item) = stream.next_sample().await {
        match item {
            Ok(sample) => process_sample(&ctx, sample).await,
            // one bad tick is recoverable
            Err(SamplerError::Provider(reason)) => {
                warn!(reason = %reason, "Sampler error, tracking continues");
            }
            // authorization loss is the only condition that tears the task
            // down entirely
            Err(SamplerError::PermissionDenied) => {
                error!("Location access revoked, stopping tracking");
                metrics::counter!("tracking_permission_losses_total").increment(1);
                // the session closes; the enabled flag stays set so the next
                // boot resumes once access returns
                if let Err(e) = ctx.sessions.close(ctx.session_id, Utc::now()).await {
                    error!(error = %e, "Failed to close tracking session");
                }
                let _ = ctx.state.send(ControllerState::Stopped);
                return;
            }
        }
    }
    // stream closed by stop(); the state transition happens there
}

async fn process_sample(ctx: &TaskContext, sample: LocationSample) {
    match &ctx.role {
        TrackingRole::Tracker { device_id } => {
            if let Err(e) = ctx.registry.record_location(*device_id, &sample).await {
                // a bad sample must not stop tracking
                error!(device_id, error = %e, "Dropping sample");
                metrics::counter!("samples_dropped_total").increment(1);
            }
        }
        TrackingRole::Companion { phone_number, .. } => {
            let report = LocationReport::from_sample(phone_number.clone(), &sample);
            match ctx.publisher.publish(&report).await {
                PublishOutcome::Delivered(ack) => {
                    if let Err(e) = ctx.sharing.record_publish(ack.timestamp).await {
                        warn!(error = %e, "Failed to persist last publish time");
                    }
                }
                // the stale timestamp stands; the next delivered sample
                // catches up
                PublishOutcome::Rejected { status, message } => {
                    warn!(status, message = %message, "Report rejected, tracking continues");
                }
                PublishOutcome::Unreachable(reason) => {
                    warn!(reason = %reason, "Endpoint unreachable, tracking continues");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_state_display() {
        assert_eq!(ControllerState::Stopped.to_string(), "stopped");
        assert_eq!(ControllerState::Starting.to_string(), "starting");
        assert_eq!(ControllerState::Running.to_string(), "running");
        assert_eq!(ControllerState::Stopping.to_string(), "stopping");
    }

    #[test]
    fn test_role_device_id() {
        let tracker = TrackingRole::Tracker { device_id: 3 };
        assert_eq!(tracker.device_id(), 3);
        assert_eq!(tracker.to_string(), "tracker");

        let companion = TrackingRole::Companion {
            device_id: 1,
            phone_number: "+15550100123".to_string(),
        };
        assert_eq!(companion.device_id(), 1);
        assert_eq!(companion.to_string(), "companion");
    }
}
