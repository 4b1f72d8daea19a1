//! Unlock endpoint handler.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use domain::models::{
    ObservationPayload, ObservationSource, ProximityObservation, UnlockOutcome, UnlockRequest,
};
use domain::services::{AccessError, UnlockOptions};
use shared::validation::{validate_capture_time, validate_signal_strength};
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::app::AppState;
use crate::config::AccessConfig;
use crate::error::ApiError;
use crate::extractors::CurrentUser;
use crate::middleware::metrics::{record_actuation, record_unlock_decision, record_unlock_error};
use crate::middleware::user_auth::UserAuth;

/// Ask to unlock a door.
///
/// POST /api/v1/doors/:door_id/unlock
///
/// Both ALLOW and DENY are 200 responses carrying an [`UnlockOutcome`].
/// 503 means a dependency was unreachable and nothing was decided.
pub async fn unlock_door(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Path(door_id): Path<Uuid>,
    Json(request): Json<UnlockRequest>,
) -> Result<Json<UnlockOutcome>, ApiError> {
    request.validate()?;

    if request.test_mode {
        authorize_test_mode(&state.config.access, &auth)?;
        warn!(
            user_id = %auth.user_id,
            door_id = %door_id,
            jti = %auth.jti,
            "Test-mode unlock requested"
        );
    }

    let observation = request
        .observation
        .map(|payload| {
            check_observation(
                payload,
                request.test_mode,
                Utc::now(),
                Duration::seconds(state.config.access.max_observation_age_secs),
            )
        })
        .transpose()?;

    let options = UnlockOptions {
        test_mode: request.test_mode,
        observation,
        simulated_beacon_id: request.simulated_beacon_id,
    };

    // Decided on its own task: once an attempt row is written, a dropped
    // connection must not cancel the dispatch before its result is recorded.
    let engine = Arc::clone(&state.engine);
    let user_id = auth.user_id;
    let decided =
        tokio::spawn(async move { engine.attempt_unlock(user_id, door_id, options).await })
            .await
            .map_err(|e| ApiError::Internal(format!("Unlock task failed: {}", e)))?;

    match decided {
        Ok(outcome) => {
            record_unlock_decision(&outcome, request.test_mode);
            if let Some(actuation) = outcome.actuation {
                record_actuation(actuation);
            }
            info!(
                user_id = %auth.user_id,
                door_id = %door_id,
                attempt_id = %outcome.attempt_id,
                decision = %outcome.decision,
                deny_reason = outcome.deny_reason.map(|r| r.as_str()),
                "Unlock decided"
            );
            Ok(Json(outcome))
        }
        Err(err) => {
            record_unlock_error(match &err {
                AccessError::InvalidRequest(_) => "invalid_request",
                AccessError::Unavailable(_) => "unavailable",
                AccessError::Storage(_) => "storage",
            });
            Err(err.into())
        }
    }
}

/// Test mode needs the deployment switch and the operator role.
fn authorize_test_mode(config: &AccessConfig, auth: &UserAuth) -> Result<(), ApiError> {
    if !config.test_mode_enabled {
        return Err(ApiError::Forbidden(
            "Test mode is disabled on this deployment".to_string(),
        ));
    }
    if !auth.is_access_operator() {
        return Err(ApiError::Forbidden(
            "Test mode requires the access operator role".to_string(),
        ));
    }
    Ok(())
}

/// Checks a submitted observation and converts it to a domain value.
///
/// Live readings must be physically plausible and recent. Simulated ones
/// carry no meaningful strength and are only accepted in test mode.
fn check_observation(
    payload: ObservationPayload,
    test_mode: bool,
    received_at: DateTime<Utc>,
    max_age: Duration,
) -> Result<ProximityObservation, ApiError> {
    match payload.source {
        ObservationSource::Simulated if !test_mode => {
            return Err(ApiError::Validation(
                "Simulated observations require test_mode".to_string(),
            ));
        }
        ObservationSource::Simulated => {}
        ObservationSource::Live => {
            validate_signal_strength(payload.signal_strength).map_err(validation_error)?;
            if let Some(captured_at) = payload.captured_at {
                validate_capture_time(captured_at, received_at, max_age)
                    .map_err(validation_error)?;
            }
        }
    }

    Ok(payload.into_observation(received_at))
}

fn validation_error(err: ValidationError) -> ApiError {
    ApiError::Validation(
        err.message
            .map(|m| m.to_string())
            .unwrap_or_else(|| err.code.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::jwt::ACCESS_OPERATOR_ROLE;

    fn access(test_mode_enabled: bool) -> AccessConfig {
        let mut config = crate::config::Config::load_for_test(&[])
            .unwrap()
            .access;
        config.test_mode_enabled = test_mode_enabled;
        config
    }

    fn caller(roles: &[&str]) -> UserAuth {
        UserAuth {
            user_id: Uuid::new_v4(),
            jti: "jti".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn payload(source: ObservationSource, signal_strength: i32) -> ObservationPayload {
        ObservationPayload {
            beacon_id: "B1".to_string(),
            signal_strength,
            source,
            captured_at: None,
        }
    }

    #[test]
    fn test_test_mode_needs_switch_and_role() {
        assert!(authorize_test_mode(&access(true), &caller(&[ACCESS_OPERATOR_ROLE])).is_ok());
        assert!(matches!(
            authorize_test_mode(&access(false), &caller(&[ACCESS_OPERATOR_ROLE])),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            authorize_test_mode(&access(true), &caller(&[])),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn test_live_observation_range_checked() {
        let now = Utc::now();
        let max_age = Duration::seconds(60);

        assert!(check_observation(payload(ObservationSource::Live, -65), false, now, max_age).is_ok());
        assert!(check_observation(payload(ObservationSource::Live, 25), false, now, max_age).is_err());
        assert!(
            check_observation(payload(ObservationSource::Live, -200), false, now, max_age).is_err()
        );
    }

    #[test]
    fn test_stale_live_observation_rejected() {
        let now = Utc::now();
        let mut stale = payload(ObservationSource::Live, -60);
        stale.captured_at = Some(now - Duration::minutes(10));

        let err = check_observation(stale, false, now, Duration::seconds(60)).unwrap_err();
        assert!(err.to_string().contains("older than"));
    }

    #[test]
    fn test_simulated_observation_requires_test_mode() {
        let now = Utc::now();
        let simulated = payload(ObservationSource::Simulated, i32::MIN);

        assert!(check_observation(simulated.clone(), false, now, Duration::seconds(60)).is_err());

        let obs = check_observation(simulated, true, now, Duration::seconds(60)).unwrap();
        assert!(obs.is_simulated());
        assert_eq!(obs.captured_at, now);
    }
}
