//! Common test utilities for integration tests.
//!
//! The app is wired to the in-memory collaborators from
//! `domain::services::testing`, so no database or network is needed.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use domain::models::{Door, ProximityPolicy};
use domain::services::testing::{
    sample_door, InMemoryDoorProvisioning, InMemoryUnlockAttemptStore, MockActuatorChannel,
    StaticMembershipValidator,
};
use door_access_api::app::{create_app, AppState, Collaborators};
use door_access_api::config::Config;
use shared::jwt::{JwtConfig, ACCESS_OPERATOR_ROLE};
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration_test_secret_0123456789";

/// Test configuration: shared-secret JWT, fast retries, no cooldown noise.
pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut overrides = vec![
        ("jwt.secret", TEST_JWT_SECRET),
        ("jwt.leeway_secs", "0"),
        ("access.retry_base_delay_ms", "1"),
    ];
    overrides.extend_from_slice(extra);
    Config::load_for_test(&overrides).expect("Failed to build test config")
}

/// The app plus handles to every fake behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provisioning: Arc<InMemoryDoorProvisioning>,
    pub membership: Arc<StaticMembershipValidator>,
    pub actuator: Arc<MockActuatorChannel>,
    pub attempts: Arc<InMemoryUnlockAttemptStore>,
}

impl TestApp {
    pub fn new(config: Config) -> Self {
        let provisioning = Arc::new(InMemoryDoorProvisioning::default());
        let membership = Arc::new(StaticMembershipValidator::all_active());
        let actuator = Arc::new(MockActuatorChannel::default());
        let attempts = Arc::new(InMemoryUnlockAttemptStore::default());

        let state = AppState::new(
            config,
            None,
            Collaborators {
                provisioning: provisioning.clone(),
                membership: membership.clone(),
                actuator: actuator.clone(),
                attempts: attempts.clone(),
            },
        )
        .expect("Failed to build app state");

        Self {
            router: create_app(state.clone()),
            state,
            provisioning,
            membership,
            actuator,
            attempts,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(test_config(&[]))
    }

    /// Adds a door and grants the user access to it.
    pub fn add_door(&self, user_id: Uuid, policy: Option<ProximityPolicy>) -> Door {
        let door = sample_door(policy);
        self.provisioning.insert(door.clone());
        self.provisioning.grant(user_id, door.id);
        door
    }
}

pub fn beacon_policy(beacon_id: &str, minimum_signal_strength: i32) -> ProximityPolicy {
    ProximityPolicy {
        beacon_id: beacon_id.to_string(),
        minimum_signal_strength,
    }
}

/// A member token.
pub fn member_token(user_id: Uuid) -> String {
    issue_token(user_id, &[])
}

/// A token carrying the access operator role.
pub fn operator_token(user_id: Uuid) -> String {
    issue_token(user_id, &[ACCESS_OPERATOR_ROLE])
}

fn issue_token(user_id: Uuid, roles: &[&str]) -> String {
    let jwt = JwtConfig::from_secret(TEST_JWT_SECRET, 0).unwrap();
    jwt.issue_access_token(user_id, roles, 900).unwrap().0
}

/// Build a JSON request with authentication.
pub fn json_request_with_auth(
    method: Method,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a GET request with authentication.
pub fn get_request_with_auth(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
}

pub fn unlock_uri(door_id: Uuid) -> String {
    format!("/api/v1/doors/{}/unlock", door_id)
}
