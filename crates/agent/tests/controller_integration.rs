//! Integration tests for the tracking controller.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::{http_response, setup_pool, spawn_stub_endpoint, test_registry};
use domain::models::{LocationSample, RegisterDeviceRequest};
use domain::services::{Authorization, StaticGrants};
use persistence::repositories::{SessionRepository, SharingStateRepository};
use phone_tracker_agent::controller::{
    ControllerError, ControllerState, TrackingController, TrackingRole,
};
use phone_tracker_agent::provider::{
    AccuracyMode, DeniedProvider, LocationProvider, ProviderError,
};
use phone_tracker_agent::publisher::LocationPublisher;
use phone_tracker_agent::registry::DeviceRegistry;
use phone_tracker_agent::sampler::SamplerConfig;
use sqlx::SqlitePool;

const ACK_BODY: &str = r#"{"success":true,"message":"Location shared successfully","timestamp":"2024-06-01T12:00:01Z"}"#;

/// Provider pinned to one position.
struct StaticProvider;

#[async_trait::async_trait]
impl LocationProvider for StaticProvider {
    async fn acquire(&self, _: AccuracyMode) -> Result<LocationSample, ProviderError> {
        Ok(LocationSample {
            latitude: 37.7749,
            longitude: -122.4194,
            timestamp: Utc::now(),
            accuracy: Some(5.0),
            speed: None,
            bearing: None,
        })
    }
}

fn fast_sampling() -> SamplerConfig {
    SamplerConfig {
        interval: Duration::from_millis(10),
        min_displacement_m: 0.0,
        max_delay: Duration::from_millis(100),
        accuracy: AccuracyMode::BestEffort,
    }
}

fn build_controller<P: LocationProvider + 'static>(
    pool: &SqlitePool,
    registry: Arc<DeviceRegistry>,
    role: TrackingRole,
    provider: P,
    authorization: Arc<dyn Authorization>,
    endpoint: String,
) -> TrackingController<P> {
    TrackingController::new(
        role,
        Arc::new(provider),
        registry,
        Arc::new(LocationPublisher::new(endpoint, Duration::from_millis(500))),
        SessionRepository::new(pool.clone()),
        SharingStateRepository::new(pool.clone()),
        authorization,
        fast_sampling(),
    )
}

async fn register_device(registry: &DeviceRegistry, phone: &str) -> i64 {
    registry
        .add(RegisterDeviceRequest::new(phone, "Test Device"))
        .await
        .expect("device registration")
        .id
}

/// Wait until the controller reports the wanted state or time runs out.
async fn wait_for_state<P: LocationProvider + 'static>(
    controller: &TrackingController<P>,
    wanted: ControllerState,
) {
    let mut state_rx = controller.subscribe_state();
    tokio::time::timeout(Duration::from_secs(2), async {
        while *state_rx.borrow_and_update() != wanted {
            state_rx.changed().await.expect("state channel open");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("controller never reached {wanted}"));
}

// ============================================================================
// Start / stop lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_twice_keeps_one_session() {
    let pool = setup_pool().await;
    let registry = test_registry(pool.clone());
    let device_id = register_device(&registry, "+15550100123").await;

    let controller = build_controller(
        &pool,
        Arc::clone(&registry),
        TrackingRole::Tracker { device_id },
        StaticProvider,
        Arc::new(StaticGrants::all()),
        "http://127.0.0.1:1/unused".to_string(),
    );

    assert_eq!(controller.start().await.unwrap(), ControllerState::Running);
    assert_eq!(controller.start().await.unwrap(), ControllerState::Running);

    let sessions = SessionRepository::new(pool.clone());
    assert_eq!(sessions.count_open(device_id).await.unwrap(), 1);

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_twice_is_noop() {
    let pool = setup_pool().await;
    let registry = test_registry(pool.clone());
    let device_id = register_device(&registry, "+15550100123").await;

    let controller = build_controller(
        &pool,
        Arc::clone(&registry),
        TrackingRole::Tracker { device_id },
        StaticProvider,
        Arc::new(StaticGrants::all()),
        "http://127.0.0.1:1/unused".to_string(),
    );

    controller.start().await.unwrap();
    assert_eq!(controller.stop().await.unwrap(), ControllerState::Stopped);
    assert_eq!(controller.stop().await.unwrap(), ControllerState::Stopped);

    let sessions = SessionRepository::new(pool.clone());
    assert_eq!(sessions.count_open(device_id).await.unwrap(), 0);

    // the one session was closed exactly once, with an end time
    let session = sqlx::query_as::<_, persistence::entities::TrackingSessionEntity>(
        "SELECT id, device_id, started_at, ended_at, active FROM tracking_sessions",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(session.ended_at.is_some());
    assert!(!session.active);

    // stopping while stopped never reopens or re-closes anything
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tracking_sessions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1);
}

#[tokio::test]
async fn test_start_denied_without_access() {
    let pool = setup_pool().await;
    let registry = test_registry(pool.clone());
    let device_id = register_device(&registry, "+15550100123").await;

    let controller = build_controller(
        &pool,
        Arc::clone(&registry),
        TrackingRole::Tracker { device_id },
        StaticProvider,
        Arc::new(StaticGrants::none()),
        "http://127.0.0.1:1/unused".to_string(),
    );

    let err = controller.start().await.unwrap_err();
    assert!(matches!(err, ControllerError::PermissionDenied));
    assert_eq!(controller.state(), ControllerState::Stopped);

    let sessions = SessionRepository::new(pool.clone());
    assert_eq!(sessions.count_open(device_id).await.unwrap(), 0);
    assert!(!SharingStateRepository::new(pool.clone())
        .load()
        .await
        .unwrap()
        .enabled);
}

#[tokio::test]
async fn test_start_unknown_device() {
    let pool = setup_pool().await;
    let registry = test_registry(pool.clone());

    let controller = build_controller(
        &pool,
        Arc::clone(&registry),
        TrackingRole::Tracker { device_id: 42 },
        StaticProvider,
        Arc::new(StaticGrants::all()),
        "http://127.0.0.1:1/unused".to_string(),
    );

    let err = controller.start().await.unwrap_err();
    assert!(matches!(err, ControllerError::UnknownDevice(42)));
    assert_eq!(controller.state(), ControllerState::Stopped);
}

// ============================================================================
// Persisted enabled flag and boot recovery
// ============================================================================

#[tokio::test]
async fn test_enabled_flag_follows_lifecycle() {
    let pool = setup_pool().await;
    let registry = test_registry(pool.clone());
    let device_id = register_device(&registry, "+15550100123").await;
    let sharing = SharingStateRepository::new(pool.clone());

    let controller = build_controller(
        &pool,
        Arc::clone(&registry),
        TrackingRole::Tracker { device_id },
        StaticProvider,
        Arc::new(StaticGrants::all()),
        "http://127.0.0.1:1/unused".to_string(),
    );

    controller.start().await.unwrap();
    assert!(sharing.load().await.unwrap().enabled);

    controller.stop().await.unwrap();
    assert!(!sharing.load().await.unwrap().enabled);
}

#[tokio::test]
async fn test_resume_if_enabled_restarts_tracking() {
    let pool = setup_pool().await;
    let registry = test_registry(pool.clone());
    let device_id = register_device(&registry, "+15550100123").await;
    let sharing = SharingStateRepository::new(pool.clone());

    // as if the process died while tracking was on
    sharing.set_enabled(true).await.unwrap();

    let controller = build_controller(
        &pool,
        Arc::clone(&registry),
        TrackingRole::Tracker { device_id },
        StaticProvider,
        Arc::new(StaticGrants::all()),
        "http://127.0.0.1:1/unused".to_string(),
    );

    assert_eq!(
        controller.resume_if_enabled().await.unwrap(),
        ControllerState::Running
    );
    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_resume_stays_stopped_when_disabled() {
    let pool = setup_pool().await;
    let registry = test_registry(pool.clone());
    let device_id = register_device(&registry, "+15550100123").await;

    let controller = build_controller(
        &pool,
        Arc::clone(&registry),
        TrackingRole::Tracker { device_id },
        StaticProvider,
        Arc::new(StaticGrants::all()),
        "http://127.0.0.1:1/unused".to_string(),
    );

    assert_eq!(
        controller.resume_if_enabled().await.unwrap(),
        ControllerState::Stopped
    );
    let sessions = SessionRepository::new(pool.clone());
    assert_eq!(sessions.count_open(device_id).await.unwrap(), 0);
}

// ============================================================================
// Per-sample processing
// ============================================================================

#[tokio::test]
async fn test_tracker_records_samples() {
    let pool = setup_pool().await;
    let registry = test_registry(pool.clone());
    let device_id = register_device(&registry, "+15550100123").await;

    let controller = build_controller(
        &pool,
        Arc::clone(&registry),
        TrackingRole::Tracker { device_id },
        StaticProvider,
        Arc::new(StaticGrants::all()),
        "http://127.0.0.1:1/unused".to_string(),
    );

    controller.start().await.unwrap();

    // wait until the first sample lands
    let mut updates = registry.subscribe();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            updates.changed().await.expect("registry notifies");
            let devices = updates.borrow_and_update().clone();
            if devices.iter().any(|d| d.last_position().is_some()) {
                break;
            }
        }
    })
    .await
    .expect("a sample should be recorded");

    controller.stop().await.unwrap();

    let device = registry.get_by_id(device_id).await.unwrap().unwrap();
    assert_eq!(device.last_position(), Some((37.7749, -122.4194)));
    assert!(device.online);
}

#[tokio::test]
async fn test_companion_updates_last_publish_time() {
    let pool = setup_pool().await;
    let registry = test_registry(pool.clone());
    let device_id = register_device(&registry, "+15550100123").await;
    let sharing = SharingStateRepository::new(pool.clone());

    let (addr, mut bodies) = spawn_stub_endpoint(http_response("200 OK", ACK_BODY)).await;
    let controller = build_controller(
        &pool,
        Arc::clone(&registry),
        TrackingRole::Companion {
            device_id,
            phone_number: "+15550100123".to_string(),
        },
        StaticProvider,
        Arc::new(StaticGrants::all()),
        format!("http://{addr}/api/location/share"),
    );

    controller.start().await.unwrap();

    let body = tokio::time::timeout(Duration::from_secs(2), bodies.recv())
        .await
        .expect("a report should be published")
        .expect("stub endpoint running");
    assert!(body.contains("\"phone_number\":\"+15550100123\""));

    controller.stop().await.unwrap();

    let state = sharing.load().await.unwrap();
    let expected = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 1).unwrap();
    assert_eq!(state.last_published_at, Some(expected));
}

#[tokio::test]
async fn test_failed_publish_keeps_stale_timestamp() {
    let pool = setup_pool().await;
    let registry = test_registry(pool.clone());
    let device_id = register_device(&registry, "+15550100123").await;
    let sharing = SharingStateRepository::new(pool.clone());

    let prior = Utc.with_ymd_and_hms(2024, 5, 30, 8, 0, 0).unwrap();
    sharing.record_publish(prior).await.unwrap();

    // nothing listens on port 1, so every publish is unreachable
    let controller = build_controller(
        &pool,
        Arc::clone(&registry),
        TrackingRole::Companion {
            device_id,
            phone_number: "+15550100123".to_string(),
        },
        StaticProvider,
        Arc::new(StaticGrants::all()),
        "http://127.0.0.1:1/api/location/share".to_string(),
    );

    controller.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    controller.stop().await.unwrap();

    // the loop survived the failures and the stale timestamp stands
    let state = sharing.load().await.unwrap();
    assert_eq!(state.last_published_at, Some(prior));
}

#[tokio::test]
async fn test_access_revoked_mid_run_stops_task() {
    let pool = setup_pool().await;
    let registry = test_registry(pool.clone());
    let device_id = register_device(&registry, "+15550100123").await;
    let sharing = SharingStateRepository::new(pool.clone());

    // access is granted at start time, but the provider reports it revoked
    // on first acquisition
    let controller = build_controller(
        &pool,
        Arc::clone(&registry),
        TrackingRole::Tracker { device_id },
        DeniedProvider,
        Arc::new(StaticGrants::all()),
        "http://127.0.0.1:1/unused".to_string(),
    );

    controller.start().await.unwrap();
    wait_for_state(&controller, ControllerState::Stopped).await;

    let sessions = SessionRepository::new(pool.clone());
    assert_eq!(sessions.count_open(device_id).await.unwrap(), 0);

    // the enabled flag survives so the next boot can retry once access
    // returns
    assert!(sharing.load().await.unwrap().enabled);
}
