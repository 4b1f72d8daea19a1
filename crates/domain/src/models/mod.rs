//! Domain models for door access.

pub mod door;
pub mod membership;
pub mod proximity;
pub mod unlock_attempt;

pub use door::{Door, DoorOnlineStatus, DoorResponse, ListDoorsResponse, ProximityPolicy};
pub use membership::MembershipStatus;
pub use proximity::{
    ObservationPayload, ObservationSource, ProximityObservation, SIMULATED_SIGNAL_STRENGTH,
};
pub use unlock_attempt::{
    ActuationDisposition, ActuationResult, ActuationStatus, DenyReason, ListUnlockAttemptsQuery,
    ListUnlockAttemptsResponse, UnlockAttempt, UnlockAttemptItem, UnlockDecision, UnlockOutcome,
    UnlockRequest,
};
