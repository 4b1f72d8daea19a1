//! Shared mapping of HTTP client failures onto collaborator errors.

use domain::services::CollaboratorError;
use reqwest::StatusCode;

/// Transport failures are retryable; a timeout is reported as such.
pub fn map_transport_error(service: &'static str, err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Timeout { service }
    } else {
        CollaboratorError::unreachable(service, err.to_string())
    }
}

/// 5xx and 429 are treated as the service being unreachable, any other
/// non-success status as a final rejection.
pub fn map_status(service: &'static str, status: StatusCode, body: String) -> CollaboratorError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        CollaboratorError::unreachable(service, format!("HTTP {}", status.as_u16()))
    } else {
        CollaboratorError::Rejected {
            service,
            message: format!("HTTP {}: {}", status.as_u16(), body),
        }
    }
}
