//! HTTP route handlers.

pub mod doors;
pub mod health;
pub mod unlock;
pub mod unlock_attempts;
