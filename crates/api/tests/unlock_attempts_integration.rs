//! Integration tests for the unlock history endpoint.
//!
//! Run with: cargo test --test unlock_attempts_integration

mod common;

use axum::http::{Method, StatusCode};
use common::{
    get_request_with_auth, json_request_with_auth, member_token, parse_response_body,
    test_config, unlock_uri, TestApp,
};
use domain::models::MembershipStatus;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

/// Rate limiting off so tests can make many attempts.
fn history_app() -> TestApp {
    TestApp::new(test_config(&[("security.rate_limit_per_minute", "0")]))
}

async fn make_attempts(app: &TestApp, user_id: Uuid, door_id: Uuid, count: usize) {
    let token = member_token(user_id);
    for _ in 0..count {
        let response = app
            .router
            .clone()
            .oneshot(json_request_with_auth(
                Method::POST,
                &unlock_uri(door_id),
                json!({}),
                &token,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

async fn get_history(app: &TestApp, uri: &str, user_id: Uuid) -> (StatusCode, serde_json::Value) {
    let response = app
        .router
        .clone()
        .oneshot(get_request_with_auth(uri, &member_token(user_id)))
        .await
        .unwrap();
    let status = response.status();
    (status, parse_response_body(response).await)
}

#[tokio::test]
async fn test_history_lists_own_attempts_newest_first() {
    let app = history_app();
    let user_id = Uuid::new_v4();
    let door = app.add_door(user_id, None);
    make_attempts(&app, user_id, door.id, 2).await;

    app.membership.set_status(user_id, MembershipStatus::inactive());
    make_attempts(&app, user_id, door.id, 1).await;

    // Someone else's attempt must not show up
    let other = Uuid::new_v4();
    app.provisioning.grant(other, door.id);
    make_attempts(&app, other, door.id, 1).await;

    let (status, body) = get_history(&app, "/api/v1/unlock-attempts", user_id).await;

    assert_eq!(status, StatusCode::OK);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 3);
    assert_eq!(data[0]["decision"], "deny");
    assert_eq!(data[0]["deny_reason"], "no_active_membership");
    assert_eq!(data[0]["actuation"], "not_applicable");
    assert_eq!(data[1]["actuation"], "suppressed");
    assert_eq!(data[2]["actuation"], "dispatched");
    assert!(body["next_cursor"].is_null());
}

#[tokio::test]
async fn test_history_pagination() {
    let app = history_app();
    let user_id = Uuid::new_v4();
    let door = app.add_door(user_id, None);
    make_attempts(&app, user_id, door.id, 5).await;

    let (_, first) = get_history(&app, "/api/v1/unlock-attempts?limit=2", user_id).await;
    assert_eq!(first["data"].as_array().unwrap().len(), 2);
    let cursor = first["next_cursor"].as_str().unwrap().to_string();

    let (_, second) = get_history(
        &app,
        &format!("/api/v1/unlock-attempts?limit=2&cursor={}", cursor),
        user_id,
    )
    .await;
    assert_eq!(second["data"].as_array().unwrap().len(), 2);
    let cursor = second["next_cursor"].as_str().unwrap().to_string();

    let (_, third) = get_history(
        &app,
        &format!("/api/v1/unlock-attempts?limit=2&cursor={}", cursor),
        user_id,
    )
    .await;
    assert_eq!(third["data"].as_array().unwrap().len(), 1);
    assert!(third["next_cursor"].is_null());

    let mut seen: Vec<String> = [&first, &second, &third]
        .iter()
        .flat_map(|page| page["data"].as_array().unwrap().clone())
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn test_history_rejects_bad_limit() {
    let app = history_app();
    let user_id = Uuid::new_v4();

    for uri in [
        "/api/v1/unlock-attempts?limit=0",
        "/api/v1/unlock-attempts?limit=101",
    ] {
        let (status, body) = get_history(&app, uri, user_id).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }
}

#[tokio::test]
async fn test_history_rejects_bad_cursor() {
    let app = history_app();

    let (status, _) = get_history(
        &app,
        "/api/v1/unlock-attempts?cursor=not-a-cursor",
        Uuid::new_v4(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_store_failure_is_500() {
    let app = history_app();
    let user_id = Uuid::new_v4();
    let door = app.add_door(user_id, None);
    app.attempts.set_fail_writes(true);

    let response = app
        .router
        .clone()
        .oneshot(json_request_with_auth(
            Method::POST,
            &unlock_uri(door.id),
            json!({}),
            &member_token(user_id),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.actuator.dispatch_calls(), 0);
}
