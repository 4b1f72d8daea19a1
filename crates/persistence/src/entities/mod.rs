//! Database entity definitions.

pub mod door;
pub mod unlock_attempt;

pub use door::{DoorEntity, DoorStatusDb};
pub use unlock_attempt::{
    ActuationDispositionDb, ActuationResultDb, ObservationSourceDb, UnlockAttemptEntity,
    UnlockDecisionDb,
};
