//! Common validation utilities.

use chrono::{DateTime, Duration, Utc};
use validator::ValidationError;

/// Weakest RSSI a radio can plausibly report, in dBm.
pub const MIN_SIGNAL_STRENGTH: i32 = -150;

/// Strongest RSSI a radio can plausibly report, in dBm.
pub const MAX_SIGNAL_STRENGTH: i32 = 20;

/// Maximum allowed future timestamp tolerance in seconds (clock skew).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 30;

/// Validates that a live signal strength reading is physically plausible.
pub fn validate_signal_strength(rssi: i32) -> Result<(), ValidationError> {
    if (MIN_SIGNAL_STRENGTH..=MAX_SIGNAL_STRENGTH).contains(&rssi) {
        Ok(())
    } else {
        let mut err = ValidationError::new("signal_strength_range");
        err.message = Some(
            format!(
                "Signal strength must be between {} and {} dBm",
                MIN_SIGNAL_STRENGTH, MAX_SIGNAL_STRENGTH
            )
            .into(),
        );
        Err(err)
    }
}

/// Validates that an observation capture time is recent.
/// - Must not be more than 30 seconds in the future (clock skew)
/// - Must not be older than `max_age`
pub fn validate_capture_time(
    captured_at: DateTime<Utc>,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Result<(), ValidationError> {
    if captured_at > now + Duration::seconds(MAX_FUTURE_TOLERANCE_SECS) {
        let mut err = ValidationError::new("captured_at_future");
        err.message = Some("Observation timestamp cannot be in the future".into());
        return Err(err);
    }

    if captured_at < now - max_age {
        let mut err = ValidationError::new("captured_at_stale");
        err.message = Some(
            format!(
                "Observation is older than {} seconds",
                max_age.num_seconds()
            )
            .into(),
        );
        return Err(err);
    }

    Ok(())
}
