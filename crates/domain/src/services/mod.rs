//! Domain services for door access.
//!
//! Services contain business logic that operates on domain models and talks
//! to the outside world only through the traits in [`collaborators`].

pub mod access_decision;
pub mod collaborators;
pub mod door_registry;
pub mod testing;

pub use access_decision::{
    evaluate_proximity, AccessDecisionEngine, AccessError, AccessPolicyConfig, UnlockOptions,
};
pub use collaborators::{
    ActuatorAck, ActuatorChannel, Clock, CollaboratorError, DoorProvisioning, MembershipValidator,
    StoreError, SystemClock, UnlockAttemptStore,
};
pub use door_registry::DoorRegistry;
