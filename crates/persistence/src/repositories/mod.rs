//! Repository implementations for database operations.

pub mod door;
pub mod unlock_attempt;

pub use door::DoorRepository;
pub use unlock_attempt::UnlockAttemptRepository;
