//! Unlock attempt domain models.
//!
//! Every call to the access decision engine produces exactly one
//! [`UnlockAttempt`]. Attempts are append-only audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::proximity::{ObservationPayload, ProximityObservation};

/// Outcome of an access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockDecision {
    Allow,
    Deny,
}

impl FromStr for UnlockDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(UnlockDecision::Allow),
            "deny" => Ok(UnlockDecision::Deny),
            _ => Err(format!("Unknown decision: {}", s)),
        }
    }
}

impl std::fmt::Display for UnlockDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnlockDecision::Allow => write!(f, "allow"),
            UnlockDecision::Deny => write!(f, "deny"),
        }
    }
}

/// Why an unlock was denied, in the order the checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    DoorNotFound,
    DoorOffline,
    NoActiveMembership,
    ProximityRequired,
    BeaconMismatch,
    ProximityTooWeak,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::DoorNotFound => "door_not_found",
            DenyReason::DoorOffline => "door_offline",
            DenyReason::NoActiveMembership => "no_active_membership",
            DenyReason::ProximityRequired => "proximity_required",
            DenyReason::BeaconMismatch => "beacon_mismatch",
            DenyReason::ProximityTooWeak => "proximity_too_weak",
        }
    }
}

impl FromStr for DenyReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "door_not_found" => Ok(DenyReason::DoorNotFound),
            "door_offline" => Ok(DenyReason::DoorOffline),
            "no_active_membership" => Ok(DenyReason::NoActiveMembership),
            "proximity_required" => Ok(DenyReason::ProximityRequired),
            "beacon_mismatch" => Ok(DenyReason::BeaconMismatch),
            "proximity_too_weak" => Ok(DenyReason::ProximityTooWeak),
            _ => Err(format!("Unknown deny reason: {}", s)),
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an attempt was the one allowed to drive the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuationDisposition {
    /// Allowed and dispatched to the actuator.
    Dispatched,
    /// Allowed inside the door's cooldown; no dispatch.
    Suppressed,
    /// Denied attempts never actuate.
    NotApplicable,
}

impl FromStr for ActuationDisposition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dispatched" => Ok(ActuationDisposition::Dispatched),
            "suppressed" => Ok(ActuationDisposition::Suppressed),
            "not_applicable" => Ok(ActuationDisposition::NotApplicable),
            _ => Err(format!("Unknown actuation disposition: {}", s)),
        }
    }
}

impl std::fmt::Display for ActuationDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActuationDisposition::Dispatched => write!(f, "dispatched"),
            ActuationDisposition::Suppressed => write!(f, "suppressed"),
            ActuationDisposition::NotApplicable => write!(f, "not_applicable"),
        }
    }
}

/// What the actuator channel said about a dispatched unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuationResult {
    Acknowledged,
    /// No acknowledgement within the timeout; the door may or may not have opened.
    TimedOut,
    /// The channel could not be reached; the door did not receive the command.
    Unavailable,
}

impl std::fmt::Display for ActuationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActuationResult::Acknowledged => write!(f, "acknowledged"),
            ActuationResult::TimedOut => write!(f, "timed_out"),
            ActuationResult::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Actuation as reported back to the caller of an allowed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuationStatus {
    /// The actuator acknowledged the unlock.
    Confirmed,
    /// Inside the cooldown window; another attempt already opened the door.
    Suppressed,
    /// Dispatch timed out; the door may have opened.
    Unknown,
}

impl ActuationStatus {
    /// `Some(true)` / `Some(false)` when known, `None` when the outcome is unknown.
    pub fn actuated(&self) -> Option<bool> {
        match self {
            ActuationStatus::Confirmed => Some(true),
            ActuationStatus::Suppressed => Some(false),
            ActuationStatus::Unknown => None,
        }
    }
}

/// Immutable audit record of one unlock attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UnlockAttempt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub door_id: Uuid,
    pub requested_at: DateTime<Utc>,
    pub decision: UnlockDecision,
    pub deny_reason: Option<DenyReason>,
    pub proximity_evidence: Option<ProximityObservation>,
    pub test_mode: bool,
    pub actuation: ActuationDisposition,
}

impl UnlockAttempt {
    pub fn allowed(
        user_id: Uuid,
        door_id: Uuid,
        requested_at: DateTime<Utc>,
        proximity_evidence: Option<ProximityObservation>,
        test_mode: bool,
        actuation: ActuationDisposition,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            door_id,
            requested_at,
            decision: UnlockDecision::Allow,
            deny_reason: None,
            proximity_evidence,
            test_mode,
            actuation,
        }
    }

    pub fn denied(
        user_id: Uuid,
        door_id: Uuid,
        requested_at: DateTime<Utc>,
        reason: DenyReason,
        proximity_evidence: Option<ProximityObservation>,
        test_mode: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            door_id,
            requested_at,
            decision: UnlockDecision::Deny,
            deny_reason: Some(reason),
            proximity_evidence,
            test_mode,
            actuation: ActuationDisposition::NotApplicable,
        }
    }
}

/// Structured result of `attempt_unlock`. DENY is a normal value here, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UnlockOutcome {
    pub attempt_id: Uuid,
    pub decision: UnlockDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_reason: Option<DenyReason>,
    /// Present only when `decision` is `allow`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actuation: Option<ActuationStatus>,
}

impl UnlockOutcome {
    pub fn denied(attempt_id: Uuid, reason: DenyReason) -> Self {
        Self {
            attempt_id,
            decision: UnlockDecision::Deny,
            deny_reason: Some(reason),
            actuation: None,
        }
    }

    pub fn allowed(attempt_id: Uuid, actuation: ActuationStatus) -> Self {
        Self {
            attempt_id,
            decision: UnlockDecision::Allow,
            deny_reason: None,
            actuation: Some(actuation),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == UnlockDecision::Allow
    }
}

/// Request body for `POST /api/v1/doors/:door_id/unlock`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct UnlockRequest {
    #[serde(default)]
    pub test_mode: bool,

    /// Only honoured together with `test_mode`.
    #[validate(length(min = 1, max = 64, message = "Beacon ID must be 1-64 characters"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulated_beacon_id: Option<String>,

    #[validate(nested)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<ObservationPayload>,
}

/// Unlock attempt as listed in a member's history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct UnlockAttemptItem {
    pub id: Uuid,
    pub door_id: Uuid,
    pub requested_at: DateTime<Utc>,
    pub decision: UnlockDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_reason: Option<DenyReason>,
    pub test_mode: bool,
    pub actuation: ActuationDisposition,
}

impl From<UnlockAttempt> for UnlockAttemptItem {
    fn from(a: UnlockAttempt) -> Self {
        Self {
            id: a.id,
            door_id: a.door_id,
            requested_at: a.requested_at,
            decision: a.decision,
            deny_reason: a.deny_reason,
            test_mode: a.test_mode,
            actuation: a.actuation,
        }
    }
}

/// Response for listing unlock attempts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ListUnlockAttemptsResponse {
    pub data: Vec<UnlockAttemptItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Query parameters for listing unlock attempts.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListUnlockAttemptsQuery {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}
