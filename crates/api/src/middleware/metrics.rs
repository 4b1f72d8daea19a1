//! Prometheus metrics.
//!
//! HTTP request metrics come from [`metrics_middleware`]; unlock decisions
//! and actuations are recorded by the unlock handler.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use domain::models::{ActuationStatus, UnlockOutcome};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Records the following metrics:
/// - `http_requests_total`: Counter with labels (method, path, status)
/// - `http_request_duration_seconds`: Histogram with labels (method, path)
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = method_to_str(req.method());
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(
        "http_requests_total",
        "method" => method,
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(duration);

    response
}

fn method_to_str(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::PATCH => "PATCH",
        Method::HEAD => "HEAD",
        Method::OPTIONS => "OPTIONS",
        _ => "OTHER",
    }
}

/// `unlock_decisions_total{decision, reason}`; reason is "none" for ALLOW.
pub fn record_unlock_decision(outcome: &UnlockOutcome, test_mode: bool) {
    let reason = outcome.deny_reason.map(|r| r.as_str()).unwrap_or("none");
    counter!(
        "unlock_decisions_total",
        "decision" => outcome.decision.to_string(),
        "reason" => reason,
        "test_mode" => if test_mode { "true" } else { "false" }
    )
    .increment(1);
}

/// `unlock_actuations_total{outcome}` for allowed attempts.
pub fn record_actuation(status: ActuationStatus) {
    counter!("unlock_actuations_total", "outcome" => actuation_label(status)).increment(1);
}

/// `unlock_errors_total{kind}` for requests that ended without a decision.
pub fn record_unlock_error(kind: &'static str) {
    counter!("unlock_errors_total", "kind" => kind).increment(1);
}

fn actuation_label(status: ActuationStatus) -> &'static str {
    match status {
        ActuationStatus::Confirmed => "confirmed",
        ActuationStatus::Suppressed => "suppressed",
        ActuationStatus::Unknown => "unknown",
    }
}

/// Records the number of doors held by the registry cache.
pub fn record_registry_size(doors: usize) {
    metrics::gauge!("door_registry_cached_doors").set(doors as f64);
}

/// Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Installs the global Prometheus recorder.
///
/// Call once at startup before anything is recorded. A second call is a no-op.
pub fn init_metrics() -> Result<(), BuildError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&[0.001, 0.005, 0.01, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0])?
        .install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle);
    Ok(())
}
