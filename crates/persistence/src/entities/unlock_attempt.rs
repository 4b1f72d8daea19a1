//! Unlock attempt entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{
    ActuationDisposition, ActuationResult, ObservationSource, ProximityObservation,
    UnlockAttempt, UnlockDecision,
};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for unlock decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "unlock_decision", rename_all = "lowercase")]
pub enum UnlockDecisionDb {
    Allow,
    Deny,
}

impl From<UnlockDecision> for UnlockDecisionDb {
    fn from(decision: UnlockDecision) -> Self {
        match decision {
            UnlockDecision::Allow => UnlockDecisionDb::Allow,
            UnlockDecision::Deny => UnlockDecisionDb::Deny,
        }
    }
}

impl From<UnlockDecisionDb> for UnlockDecision {
    fn from(decision: UnlockDecisionDb) -> Self {
        match decision {
            UnlockDecisionDb::Allow => UnlockDecision::Allow,
            UnlockDecisionDb::Deny => UnlockDecision::Deny,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "actuation_disposition", rename_all = "snake_case")]
pub enum ActuationDispositionDb {
    Dispatched,
    Suppressed,
    NotApplicable,
}

impl From<ActuationDisposition> for ActuationDispositionDb {
    fn from(disposition: ActuationDisposition) -> Self {
        match disposition {
            ActuationDisposition::Dispatched => ActuationDispositionDb::Dispatched,
            ActuationDisposition::Suppressed => ActuationDispositionDb::Suppressed,
            ActuationDisposition::NotApplicable => ActuationDispositionDb::NotApplicable,
        }
    }
}

impl From<ActuationDispositionDb> for ActuationDisposition {
    fn from(disposition: ActuationDispositionDb) -> Self {
        match disposition {
            ActuationDispositionDb::Dispatched => ActuationDisposition::Dispatched,
            ActuationDispositionDb::Suppressed => ActuationDisposition::Suppressed,
            ActuationDispositionDb::NotApplicable => ActuationDisposition::NotApplicable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "actuation_result", rename_all = "snake_case")]
pub enum ActuationResultDb {
    Acknowledged,
    TimedOut,
    Unavailable,
}

impl From<ActuationResult> for ActuationResultDb {
    fn from(result: ActuationResult) -> Self {
        match result {
            ActuationResult::Acknowledged => ActuationResultDb::Acknowledged,
            ActuationResult::TimedOut => ActuationResultDb::TimedOut,
            ActuationResult::Unavailable => ActuationResultDb::Unavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "observation_source", rename_all = "lowercase")]
pub enum ObservationSourceDb {
    Live,
    Simulated,
}

impl From<ObservationSource> for ObservationSourceDb {
    fn from(source: ObservationSource) -> Self {
        match source {
            ObservationSource::Live => ObservationSourceDb::Live,
            ObservationSource::Simulated => ObservationSourceDb::Simulated,
        }
    }
}

impl From<ObservationSourceDb> for ObservationSource {
    fn from(source: ObservationSourceDb) -> Self {
        match source {
            ObservationSourceDb::Live => ObservationSource::Live,
            ObservationSourceDb::Simulated => ObservationSource::Simulated,
        }
    }
}

/// Database row mapping for the unlock_attempts table.
#[derive(Debug, Clone, FromRow)]
pub struct UnlockAttemptEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub door_id: Uuid,
    pub requested_at: DateTime<Utc>,
    pub decision: UnlockDecisionDb,
    pub deny_reason: Option<String>,
    pub evidence_beacon_id: Option<String>,
    pub evidence_signal_strength: Option<i32>,
    pub evidence_source: Option<ObservationSourceDb>,
    pub evidence_captured_at: Option<DateTime<Utc>>,
    pub test_mode: bool,
    pub actuation: ActuationDispositionDb,
}

impl From<UnlockAttemptEntity> for UnlockAttempt {
    fn from(entity: UnlockAttemptEntity) -> Self {
        let proximity_evidence = match (
            entity.evidence_beacon_id,
            entity.evidence_signal_strength,
            entity.evidence_source,
            entity.evidence_captured_at,
        ) {
            (Some(beacon_id), Some(signal_strength), Some(source), Some(captured_at)) => {
                Some(ProximityObservation {
                    beacon_id,
                    signal_strength,
                    source: source.into(),
                    captured_at,
                })
            }
            _ => None,
        };

        Self {
            id: entity.id,
            user_id: entity.user_id,
            door_id: entity.door_id,
            requested_at: entity.requested_at,
            decision: entity.decision.into(),
            deny_reason: entity.deny_reason.and_then(|r| r.parse().ok()),
            proximity_evidence,
            test_mode: entity.test_mode,
            actuation: entity.actuation.into(),
        }
    }
}
