//! Interfaces to the systems the access decision engine depends on.
//!
//! Implementations live elsewhere: Postgres repositories in `persistence`,
//! HTTP clients in `api`, and in-memory fakes in [`super::testing`].

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ActuationResult, Door, MembershipStatus, UnlockAttempt};

/// Failure talking to an external collaborator.
///
/// These are infrastructure faults and must never be reported as a DENY.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{service} unreachable: {message}")]
    Unreachable {
        service: &'static str,
        message: String,
    },

    #[error("{service} did not respond in time")]
    Timeout { service: &'static str },

    #[error("{service} rejected the request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },
}

impl CollaboratorError {
    pub fn unreachable(service: &'static str, message: impl Into<String>) -> Self {
        CollaboratorError::Unreachable {
            service,
            message: message.into(),
        }
    }

    /// Whether retrying the same call could help. A rejection is final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Unreachable { .. } | CollaboratorError::Timeout { .. }
        )
    }
}

/// Failure reading or writing unlock attempt records.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unlock attempt store error: {0}")]
pub struct StoreError(pub String);

/// Subscription service.
#[async_trait::async_trait]
pub trait MembershipValidator: Send + Sync {
    async fn get_status(&self, user_id: Uuid) -> Result<MembershipStatus, CollaboratorError>;
}

/// Source of truth for door records, owned by door provisioning.
#[async_trait::async_trait]
pub trait DoorProvisioning: Send + Sync {
    async fn get(&self, door_id: Uuid) -> Result<Option<Door>, CollaboratorError>;

    /// Doors the user may see. Visibility is not authorization; the engine
    /// re-checks every attempt.
    async fn list_accessible_doors(&self, user_id: Uuid) -> Result<Vec<Door>, CollaboratorError>;

    async fn list_all(&self) -> Result<Vec<Door>, CollaboratorError>;
}

/// Acknowledgement from a door actuator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorAck {
    pub door_id: Uuid,
    pub attempt_id: Uuid,
    pub acknowledged_at: DateTime<Utc>,
}

/// Communication path to a door's lock mechanism.
///
/// `attempt_id` is the idempotency key: delivering the same id twice must
/// not actuate twice.
#[async_trait::async_trait]
pub trait ActuatorChannel: Send + Sync {
    async fn dispatch_unlock(
        &self,
        door_id: Uuid,
        attempt_id: Uuid,
    ) -> Result<ActuatorAck, CollaboratorError>;
}

/// Append-only storage for unlock attempts.
#[async_trait::async_trait]
pub trait UnlockAttemptStore: Send + Sync {
    async fn record_attempt(&self, attempt: &UnlockAttempt) -> Result<(), StoreError>;

    /// Time of the latest attempt for the door that was dispatched to the
    /// actuator, ignoring dispatches recorded as [`ActuationResult::Unavailable`].
    async fn last_dispatched_at(&self, door_id: Uuid) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn record_actuation_result(
        &self,
        attempt_id: Uuid,
        result: ActuationResult,
    ) -> Result<(), StoreError>;

    /// Newest first, strictly older than `before` when given.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        before: Option<(DateTime<Utc>, Uuid)>,
        limit: i64,
    ) -> Result<Vec<UnlockAttempt>, StoreError>;
}

/// Wall-clock source, replaceable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
