use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

use domain::models::RegisterDeviceRequest;
use domain::services::{Authorization, StaticGrants};
use persistence::repositories::{SessionRepository, SharingStateRepository};
use phone_tracker_agent::config::{Config, RoleKind};
use phone_tracker_agent::controller::{TrackingController, TrackingRole};
use phone_tracker_agent::logging;
use phone_tracker_agent::provider::SimulatedProvider;
use phone_tracker_agent::publisher::LocationPublisher;
use phone_tracker_agent::registry::DeviceRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    logging::init_logging(&config.logging);

    info!("Starting Phone Tracker agent v{}", env!("CARGO_PKG_VERSION"));

    if config.metrics.enabled {
        let addr: SocketAddr = config
            .metrics
            .listen_addr
            .parse()
            .context("invalid metrics.listen_addr")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install metrics exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }

    let pool = persistence::db::create_pool(&config.database).await?;

    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations").run(&pool).await?;
    info!("Migrations completed");

    let freshness = chrono::Duration::seconds(config.tracking.freshness_window_secs as i64);
    let registry = Arc::new(DeviceRegistry::new(pool.clone(), freshness));

    let role = build_role(&config, &registry).await?;
    let provider = Arc::new(SimulatedProvider::new(
        config.sampling.start_latitude,
        config.sampling.start_longitude,
    ));
    let publisher = Arc::new(LocationPublisher::new(
        &config.sharing.endpoint,
        Duration::from_secs(config.sharing.timeout_secs),
    ));
    // the daemon has no prompt UI; grants come from the deployment
    let authorization: Arc<dyn Authorization> = Arc::new(StaticGrants::all());

    let controller = TrackingController::new(
        role,
        provider,
        Arc::clone(&registry),
        publisher,
        SessionRepository::new(pool.clone()),
        SharingStateRepository::new(pool),
        authorization,
        config.sampling.sampler_config(),
    );

    // boot-event collaborator: resume tracking if it was enabled before the
    // last shutdown
    match controller.resume_if_enabled().await {
        Ok(state) => info!(state = %state, "Boot recovery complete"),
        Err(e) => error!(error = %e, "Boot recovery failed"),
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining tracking task");
    controller.stop().await?;

    Ok(())
}

/// Resolve the configured role against the local registry.
///
/// The companion registers itself under its own phone number on first run,
/// so its sessions have a device row to anchor to.
async fn build_role(config: &Config, registry: &DeviceRegistry) -> Result<TrackingRole> {
    match config.tracking.role {
        RoleKind::Tracker => {
            let device_id = config
                .tracking
                .device_id
                .context("tracking.device_id is required for the tracker role")?;
            Ok(TrackingRole::Tracker { device_id })
        }
        RoleKind::Companion => {
            let device = match registry
                .get_by_phone_number(&config.sharing.phone_number)
                .await?
            {
                Some(device) => device,
                None => {
                    info!("Registering this device in the local store");
                    registry
                        .add(RegisterDeviceRequest::new(
                            &config.sharing.phone_number,
                            &config.sharing.device_name,
                        ))
                        .await?
                }
            };
            Ok(TrackingRole::Companion {
                device_id: device.id,
                phone_number: device.phone_number,
            })
        }
    }
}
