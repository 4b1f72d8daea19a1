use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use domain::services::{ActuatorChannel, MembershipValidator};
use persistence::repositories::{DoorRepository, UnlockAttemptRepository};
use tracing::{info, warn};

use door_access_api::app::{self, AppState, Collaborators};
use door_access_api::config::Config;
use door_access_api::jobs::{DoorRegistryRefreshJob, JobScheduler, PoolMetricsJob};
use door_access_api::middleware::{self, metrics::record_registry_size};
use door_access_api::services::{
    ConsoleActuatorChannel, HttpActuatorChannel, HttpMembershipValidator,
    StaticMembershipValidator,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    middleware::logging::init_logging(&config.logging)?;
    middleware::init_metrics()?;

    info!("Starting door access API v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&(&config.database).into()).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let membership: Arc<dyn MembershipValidator> = match config.membership.provider.as_str() {
        "static" => {
            warn!("Membership checks disabled, every user is treated as active");
            Arc::new(StaticMembershipValidator)
        }
        _ => Arc::new(HttpMembershipValidator::new(&config.membership)?),
    };

    let actuator: Arc<dyn ActuatorChannel> = match config.actuator.provider.as_str() {
        "mock" => {
            warn!("Using mock actuator, no door hardware will be driven");
            Arc::new(ConsoleActuatorChannel)
        }
        _ => Arc::new(HttpActuatorChannel::new(&config.actuator)?),
    };

    let collaborators = Collaborators {
        provisioning: Arc::new(DoorRepository::new(pool.clone())),
        membership,
        actuator,
        attempts: Arc::new(UnlockAttemptRepository::new(pool.clone())),
    };

    let refresh_interval = config.access.registry_refresh_interval();
    let addr = config.socket_addr()?;
    let state = AppState::new(config, Some(pool.clone()), collaborators)?;

    match state.registry.refresh().await {
        Ok(count) => record_registry_size(count),
        Err(e) => warn!(error = %e, "Initial door registry load failed, serving on demand"),
    }

    let mut scheduler = JobScheduler::new();
    scheduler.register(DoorRegistryRefreshJob::new(
        Arc::clone(&state.registry),
        refresh_interval,
    ));
    scheduler.register(PoolMetricsJob::new(pool));
    scheduler.start();

    let app = app::create_app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, waiting for background jobs");
    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(10)).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
