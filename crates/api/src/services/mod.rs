//! External service integrations.

pub mod actuator;
pub mod http;
pub mod membership;

pub use actuator::{ConsoleActuatorChannel, HttpActuatorChannel};
pub use membership::{HttpMembershipValidator, StaticMembershipValidator};
