//! Integration tests for door listing and lookup endpoints.
//!
//! Run with: cargo test --test doors_integration

mod common;

use axum::http::StatusCode;
use common::{
    beacon_policy, get_request, get_request_with_auth, member_token, parse_response_body, TestApp,
};
use domain::models::DoorOnlineStatus;
use tower::ServiceExt;
use uuid::Uuid;

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_list_doors_requires_token() {
    let app = TestApp::with_defaults();

    let response = app
        .router
        .oneshot(get_request("/api/v1/doors"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_list_doors_rejects_garbage_token() {
    let app = TestApp::with_defaults();

    let response = app
        .router
        .oneshot(get_request_with_auth("/api/v1/doors", "not-a-jwt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_doors_returns_only_granted_doors() {
    let app = TestApp::with_defaults();
    let user_id = Uuid::new_v4();
    let mine = app.add_door(user_id, Some(beacon_policy("B1", -70)));
    let _someone_elses = app.add_door(Uuid::new_v4(), None);

    let response = app
        .router
        .oneshot(get_request_with_auth("/api/v1/doors", &member_token(user_id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["doors"][0]["id"], mine.id.to_string());
    assert_eq!(body["doors"][0]["requires_proximity"], true);
    assert_eq!(body["doors"][0]["beacon_id"], "B1");
    assert!(body["doors"][0].get("minimum_signal_strength").is_none());
}

#[tokio::test]
async fn test_list_doors_empty_for_new_user() {
    let app = TestApp::with_defaults();

    let response = app
        .router
        .oneshot(get_request_with_auth(
            "/api/v1/doors",
            &member_token(Uuid::new_v4()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["total"], 0);
    assert_eq!(body["doors"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_list_doors_provisioning_outage_is_503() {
    let app = TestApp::with_defaults();
    let user_id = Uuid::new_v4();
    app.add_door(user_id, None);
    app.provisioning.set_unreachable(true);

    let response = app
        .router
        .oneshot(get_request_with_auth("/api/v1/doors", &member_token(user_id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// Lookup
// ============================================================================

#[tokio::test]
async fn test_get_door() {
    let app = TestApp::with_defaults();
    let user_id = Uuid::new_v4();
    let door = app.add_door(user_id, None);

    let response = app
        .router
        .oneshot(get_request_with_auth(
            &format!("/api/v1/doors/{}", door.id),
            &member_token(user_id),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["name"], door.name);
    assert_eq!(body["online_status"], "online");
    assert_eq!(body["requires_proximity"], false);
    assert!(body.get("beacon_id").is_none());
}

#[tokio::test]
async fn test_get_unknown_door_is_404() {
    let app = TestApp::with_defaults();

    let response = app
        .router
        .oneshot(get_request_with_auth(
            &format!("/api/v1/doors/{}", Uuid::new_v4()),
            &member_token(Uuid::new_v4()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_get_door_reflects_refreshed_status() {
    let app = TestApp::with_defaults();
    let user_id = Uuid::new_v4();
    let door = app.add_door(user_id, None);
    let uri = format!("/api/v1/doors/{}", door.id);

    let first = app
        .router
        .clone()
        .oneshot(get_request_with_auth(&uri, &member_token(user_id)))
        .await
        .unwrap();
    assert_eq!(parse_response_body(first).await["online_status"], "online");

    app.provisioning.set_status(door.id, DoorOnlineStatus::Offline);
    app.state.registry.refresh().await.unwrap();

    let second = app
        .router
        .oneshot(get_request_with_auth(&uri, &member_token(user_id)))
        .await
        .unwrap();
    assert_eq!(parse_response_body(second).await["online_status"], "offline");
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_without_database() {
    let app = TestApp::with_defaults();
    app.add_door(Uuid::new_v4(), None);
    app.state.registry.refresh().await.unwrap();

    let response = app.router.oneshot(get_request("/api/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["configured"], false);
    assert_eq!(body["cached_doors"], 1);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = TestApp::with_defaults();

    let response = app
        .router
        .oneshot(get_request("/api/health/live"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}
