use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use domain::services::{
    AccessDecisionEngine, ActuatorChannel, DoorProvisioning, DoorRegistry, MembershipValidator,
    UnlockAttemptStore,
};
use shared::jwt::{JwtConfig, JwtError};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{Config, JwtAuthConfig};
use crate::middleware::{
    metrics_handler, metrics_middleware, rate_limit_middleware, require_user_auth,
    security_headers_middleware, trace_id, RateLimiterState,
};
use crate::routes::{doors, health, unlock, unlock_attempts};

/// Everything a request handler may need.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when running on in-memory collaborators.
    pub pool: Option<PgPool>,
    pub registry: Arc<DoorRegistry>,
    pub engine: Arc<AccessDecisionEngine>,
    pub attempts: Arc<dyn UnlockAttemptStore>,
    pub jwt: Arc<JwtConfig>,
    pub rate_limiter: Option<Arc<RateLimiterState>>,
}

/// The external systems the service talks to.
pub struct Collaborators {
    pub provisioning: Arc<dyn DoorProvisioning>,
    pub membership: Arc<dyn MembershipValidator>,
    pub actuator: Arc<dyn ActuatorChannel>,
    pub attempts: Arc<dyn UnlockAttemptStore>,
}

/// Builds the verifier from config. A public key wins over a shared secret.
pub fn jwt_from_config(config: &JwtAuthConfig) -> Result<JwtConfig, JwtError> {
    if !config.public_key.is_empty() {
        JwtConfig::from_rsa_public_pem(&config.public_key, config.leeway_secs)
    } else {
        JwtConfig::from_secret(&config.secret, config.leeway_secs)
    }
}

impl AppState {
    pub fn new(
        config: Config,
        pool: Option<PgPool>,
        collaborators: Collaborators,
    ) -> Result<Self, JwtError> {
        let jwt = jwt_from_config(&config.jwt)?;

        let registry = Arc::new(DoorRegistry::new(
            collaborators.provisioning,
            config.access.registry_ttl(),
        ));
        let engine = Arc::new(AccessDecisionEngine::new(
            Arc::clone(&registry),
            collaborators.membership,
            collaborators.actuator,
            Arc::clone(&collaborators.attempts),
            config.access.policy(),
        ));

        // Rate limiting is disabled when rate_limit_per_minute is 0
        let rate_limiter = (config.security.rate_limit_per_minute > 0).then(|| {
            Arc::new(RateLimiterState::new(
                config.security.rate_limit_per_minute,
            ))
        });

        Ok(Self {
            config: Arc::new(config),
            pool,
            registry,
            engine,
            attempts: collaborators.attempts,
            jwt: Arc::new(jwt),
            rate_limiter,
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let cors = if config.security.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Unlock is the only route that drives hardware, so only it is rate limited.
    // Middleware order: auth runs first, then rate limiting (which needs the caller)
    let unlock_routes = Router::new()
        .route("/api/v1/doors/:door_id/unlock", post(unlock::unlock_door))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_user_auth,
        ));

    let member_routes = Router::new()
        .route("/api/v1/doors", get(doors::list_doors))
        .route("/api/v1/doors/:door_id", get(doors::get_door))
        .route(
            "/api/v1/unlock-attempts",
            get(unlock_attempts::list_unlock_attempts),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_user_auth,
        ));

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(member_routes)
        .merge(unlock_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
